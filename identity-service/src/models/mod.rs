pub mod account;
pub mod identity;

pub use account::{
    Account, AccountResponse, AccountType, LoginRequest, LoginResponse, SignupRequest, Tokens,
    UpdateAccountRequest,
};
pub use identity::{Identity, IdentityProvider};
