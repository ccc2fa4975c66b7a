//! Identity model - one authentication method bound to exactly one account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identity provider codes. `email` is the password credential; the rest
/// are external OAuth providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProvider {
    Email,
    Google,
    Microsoft,
}

impl IdentityProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityProvider::Email => "email",
            IdentityProvider::Google => "google",
            IdentityProvider::Microsoft => "microsoft",
        }
    }

    pub fn is_oauth(&self) -> bool {
        !matches!(self, IdentityProvider::Email)
    }
}

impl std::str::FromStr for IdentityProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(IdentityProvider::Email),
            "google" => Ok(IdentityProvider::Google),
            "microsoft" => Ok(IdentityProvider::Microsoft),
            _ => Err(format!("Invalid identity provider: {}", s)),
        }
    }
}

/// Identity entity. The pair (provider, uid) is globally unique; an
/// identity never moves to another account after creation.
#[derive(Debug, Clone, FromRow)]
pub struct Identity {
    pub iid: i64,
    pub provider: String,
    pub uid: String,
    /// Present only for the `email` provider.
    pub pw_hash: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub account_iid: i64,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Password identity: uid is the account email, unconfirmed until the
    /// address is verified.
    pub fn new_password(account_iid: i64, email: &str, pw_hash: String) -> Self {
        Self {
            iid: 0,
            provider: IdentityProvider::Email.as_str().to_string(),
            uid: email.to_string(),
            pw_hash: Some(pw_hash),
            confirmed_at: None,
            account_iid,
            created_at: Utc::now(),
        }
    }

    /// OAuth identity: uid is the provider's user id. The provider has
    /// already verified the email, so the identity starts confirmed.
    pub fn new_oauth(provider: IdentityProvider, account_iid: i64, uid: &str) -> Self {
        Self {
            iid: 0,
            provider: provider.as_str().to_string(),
            uid: uid.to_string(),
            pw_hash: None,
            confirmed_at: Some(Utc::now()),
            account_iid,
            created_at: Utc::now(),
        }
    }

    pub fn is_password(&self) -> bool {
        self.provider == IdentityProvider::Email.as_str()
    }
}
