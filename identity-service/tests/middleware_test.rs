//! Auth middleware behavior on protected routes. These run without a
//! database: every case is rejected before a handler executes.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use identity_service::build_router;
use identity_service::services::Claims;
use tower::util::ServiceExt;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_authorization_header_is_401() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "missing_auth");
}

#[tokio::test]
async fn non_bearer_scheme_is_401() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, "Token abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "missing_auth");
}

#[tokio::test]
async fn garbage_token_is_401_invalid_credentials() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, "Bearer not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_credentials");
}

#[tokio::test]
async fn expired_token_is_401_invalid_credentials() {
    let state = common::lazy_test_state();
    let app = build_router(state.clone());

    let now = Utc::now().timestamp();
    let expired = state
        .jwt
        .sign_claims(&Claims {
            sub: "a@example.com".to_string(),
            iss: "identity-service".to_string(),
            iat: now - 3600,
            exp: now - 1800,
        })
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", expired))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Expired and malformed tokens are indistinguishable to the client.
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_credentials");
}

#[tokio::test]
async fn lowercase_bearer_prefix_is_accepted() {
    let state = common::lazy_test_state();
    let app = build_router(state.clone());

    let token = state.jwt.sign("a@example.com").unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, format!("bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // The middleware let the request through; the handler then failed on
    // the unreachable test database, which is a 500, not a 401.
    assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
}
