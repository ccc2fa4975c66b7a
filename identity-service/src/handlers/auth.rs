//! Password signup and login endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::models::{LoginRequest, SignupRequest};
use crate::utils::ValidatedJson;
use crate::AppState;
use service_core::error::AppError;

/// POST /signup
#[tracing::instrument(skip_all, fields(email = %req.email))]
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.reconciler.signup(&req).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

/// POST /login
#[tracing::instrument(skip_all, fields(email = %req.email))]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.reconciler.login(&req.email, &req.password).await?;
    Ok((StatusCode::OK, Json(res)))
}
