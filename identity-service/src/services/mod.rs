//! Services layer: persistence, token signing, OAuth flows and identity
//! reconciliation.

mod database;
mod jwt;
pub mod oauth;
mod reconcile;

pub use database::Database;
pub use jwt::{Claims, JwtService};
pub use oauth::{OAuthResult, OAuthService};
pub use reconcile::Reconciler;
