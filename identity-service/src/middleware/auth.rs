use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::services::Claims;
use crate::AppState;
use service_core::error::AppError;

/// Private extension entry. The type is the context key: code outside this
/// module cannot forge it by inserting a same-named value.
#[derive(Clone)]
struct AuthContext(Claims);

/// Middleware guarding protected routes: extracts the bearer token,
/// verifies it and injects the claims into the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or("");

    let token = strip_bearer(header_value);
    if token.is_empty() {
        return Err(AppError::MissingAuth);
    }

    let claims = state.jwt.verify(token)?;
    req.extensions_mut().insert(AuthContext(claims));

    Ok(next.run(req).await)
}

/// `Bearer` matches case-insensitively; anything else counts as a missing
/// token.
fn strip_bearer(value: &str) -> &str {
    let prefix = "bearer ";
    if value.len() >= prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
        value[prefix.len()..].trim()
    } else {
        ""
    }
}

/// Extractor handing verified claims to handlers behind the middleware.
pub struct AuthAccount(pub Claims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthAccount
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<AuthContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth claims missing from request extensions"
            ))
        })?;

        Ok(AuthAccount(context.0.clone()))
    }
}
