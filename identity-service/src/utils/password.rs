use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use service_core::error::AppError;

/// Newtype for password to prevent accidental logging
#[derive(Debug, Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password using Argon2id with a per-hash random salt embedded in
/// the output.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, AppError> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash in constant time.
///
/// A wrong password and a broken stored hash are different failures: the
/// first is the invalid-credentials class, the second an internal error.
/// Both reach the client as the same generic response.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<(), AppError> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Malformed password hash: {}", e)))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|e| match e {
            argon2::password_hash::Error::Password => {
                AppError::InvalidCredentials(anyhow::anyhow!("Password mismatch"))
            }
            other => {
                AppError::InternalError(anyhow::anyhow!("Password verification error: {}", other))
            }
        })
}
