//! Profile endpoints for the authenticated account.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::middleware::AuthAccount;
use crate::models::{AccountResponse, UpdateAccountRequest};
use crate::utils::ValidatedJson;
use crate::AppState;
use service_core::error::AppError;

/// GET /me
pub async fn get_me(
    State(state): State<AppState>,
    AuthAccount(claims): AuthAccount,
) -> Result<impl IntoResponse, AppError> {
    let account = state
        .db
        .find_account_by_email(&claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("no_account", anyhow::anyhow!("Account not found")))?;

    Ok(Json(AccountResponse::from(account)))
}

/// PUT /me
///
/// The target account comes from the verified token subject; the body only
/// carries the fields to change.
pub async fn update_me(
    State(state): State<AppState>,
    AuthAccount(claims): AuthAccount,
    ValidatedJson(req): ValidatedJson<UpdateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut account = state
        .db
        .find_account_by_email(&claims.sub)
        .await?
        .ok_or_else(|| AppError::not_found("no_account", anyhow::anyhow!("Account not found")))?;

    if let Some(summary) = req.summary {
        if !summary.is_empty() {
            account.summary = Some(summary);
        }
    }
    if let Some(area_of_expertise) = req.area_of_expertise {
        account.area_of_expertise = area_of_expertise;
    }
    if let Some(certifications) = req.certifications {
        account.certifications = certifications;
    }

    account.validate()?;
    state.db.update_account(&account).await?;

    Ok((StatusCode::OK, Json(serde_json::json!({"status": "ok"}))))
}
