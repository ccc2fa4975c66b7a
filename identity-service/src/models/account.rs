//! Account model - a registered user and their profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Account type tags. An account carries at least one; linking an OAuth
/// identity can add more, never remove any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Regular,
    Consultant,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Regular => "regular",
            AccountType::Consultant => "consultant",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regular" => Ok(AccountType::Regular),
            "consultant" => Ok(AccountType::Consultant),
            _ => Err(format!("Invalid account type: {}", s)),
        }
    }
}

/// Account entity.
#[derive(Debug, Clone, FromRow, Validate)]
pub struct Account {
    pub iid: i64,
    #[validate(email)]
    pub email: String,
    #[sqlx(rename = "type")]
    #[validate(length(min = 1))]
    pub types: Vec<String>,
    pub summary: Option<String>,
    pub area_of_expertise: Vec<String>,
    pub certifications: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a single type tag. The iid is assigned by
    /// the database on insert.
    pub fn new(email: String, account_type: AccountType) -> Self {
        Self {
            iid: 0,
            email,
            types: vec![account_type.as_str().to_string()],
            summary: None,
            area_of_expertise: Vec::new(),
            certifications: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn has_type(&self, account_type: AccountType) -> bool {
        self.types.iter().any(|t| t == account_type.as_str())
    }

    /// Additive merge. Returns true when the type set actually grew.
    pub fn merge_type(&mut self, account_type: AccountType) -> bool {
        if self.has_type(account_type) {
            return false;
        }
        self.types.push(account_type.as_str().to_string());
        true
    }
}

/// Request to sign up with email and password.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

/// Request to log in with email and password.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Tokens {
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

/// Payload returned by every successful signup, login or OAuth flow.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub tokens: Tokens,
}

impl LoginResponse {
    pub fn new(access_token: String) -> Self {
        Self {
            tokens: Tokens { access_token },
        }
    }
}

/// Account profile as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub email: String,
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub summary: Option<String>,
    pub area_of_expertise: Vec<String>,
    pub certifications: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(a: Account) -> Self {
        Self {
            email: a.email,
            types: a.types,
            summary: a.summary,
            area_of_expertise: a.area_of_expertise,
            certifications: a.certifications,
            created_at: a.created_at,
        }
    }
}

/// Request to update profile fields; absent fields are left untouched.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    pub summary: Option<String>,
    pub area_of_expertise: Option<Vec<String>>,
    pub certifications: Option<Vec<String>>,
}
