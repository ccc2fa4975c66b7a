use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy for the HTTP surface.
///
/// Variants map to one status/code pair each; `NotFound` and `Conflict`
/// carry their machine code because more than one resource can 404 or 409.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Authorization required")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials(anyhow::Error),

    #[error("{source}")]
    NotFound {
        code: &'static str,
        source: anyhow::Error,
    },

    #[error("{source}")]
    Conflict {
        code: &'static str,
        source: anyhow::Error,
    },

    #[error("Upstream provider failure: {0}")]
    UpstreamProvider(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn not_found(code: &'static str, source: anyhow::Error) -> Self {
        AppError::NotFound { code, source }
    }

    pub fn conflict(code: &'static str, source: anyhow::Error) -> Self {
        AppError::Conflict { code, source }
    }

    /// Status and machine code this error maps to at the HTTP boundary.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::ValidationError(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            AppError::MissingAuth => (StatusCode::UNAUTHORIZED, "missing_auth"),
            AppError::InvalidCredentials(_) => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::NotFound { code, .. } => (StatusCode::NOT_FOUND, *code),
            AppError::Conflict { code, .. } => (StatusCode::CONFLICT, *code),
            AppError::UpstreamProvider(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: String,
    debug: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Full detail stays in the server log; what crosses the boundary
        // depends on the class.
        let (message, debug) = match &self {
            AppError::ValidationError(err) => ("Invalid request".to_string(), err.to_string()),
            AppError::BadRequest(err) => ("Invalid request".to_string(), err.to_string()),
            AppError::MissingAuth => (
                "Authorization required".to_string(),
                "bearer token is missing or malformed".to_string(),
            ),
            AppError::InvalidCredentials(err) => {
                tracing::info!(error = %err, "Credential verification failed");
                (
                    "Invalid credentials".to_string(),
                    "credential verification failed".to_string(),
                )
            }
            AppError::NotFound { source, .. } => (source.to_string(), source.to_string()),
            AppError::Conflict { source, .. } => (source.to_string(), source.to_string()),
            AppError::UpstreamProvider(err) => {
                tracing::error!(error = %err, "Upstream provider failure");
                (
                    "Upstream provider failure".to_string(),
                    "provider request failed".to_string(),
                )
            }
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "Internal error");
                ("Internal server error".to_string(), "see server logs".to_string())
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                ("Internal server error".to_string(), "see server logs".to_string())
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                ("Internal server error".to_string(), "see server logs".to_string())
            }
        };

        (
            status,
            Json(ErrorEnvelope {
                error: ErrorBody {
                    message,
                    code: code.to_string(),
                    debug,
                },
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_and_code_mapping() {
        let cases: Vec<(AppError, StatusCode, &str)> = vec![
            (
                AppError::BadRequest(anyhow::anyhow!("bad")),
                StatusCode::BAD_REQUEST,
                "invalid_request",
            ),
            (AppError::MissingAuth, StatusCode::UNAUTHORIZED, "missing_auth"),
            (
                AppError::InvalidCredentials(anyhow::anyhow!("nope")),
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
            ),
            (
                AppError::not_found("no_account", anyhow::anyhow!("Account not found")),
                StatusCode::NOT_FOUND,
                "no_account",
            ),
            (
                AppError::conflict("account_exists", anyhow::anyhow!("Account with email already exists")),
                StatusCode::CONFLICT,
                "account_exists",
            ),
            (
                AppError::UpstreamProvider(anyhow::anyhow!("exchange failed")),
                StatusCode::BAD_GATEWAY,
                "upstream_error",
            ),
            (
                AppError::InternalError(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
                "server_error",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code));
        }
    }

    #[tokio::test]
    async fn envelope_shape() {
        let response =
            AppError::conflict("account_exists", anyhow::anyhow!("Account with email already exists"))
                .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "account_exists");
        assert_eq!(body["error"]["message"], "Account with email already exists");
        assert!(body["error"]["debug"].is_string());
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let response = AppError::DatabaseError(anyhow::anyhow!("connection refused to 10.0.0.5"))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        let debug = body["error"]["debug"].as_str().unwrap();
        assert!(!debug.contains("10.0.0.5"));
    }
}
