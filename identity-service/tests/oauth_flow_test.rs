//! Router-level tests for the OAuth flow endpoints.
//!
//! None of these touch the database or the network: the authorize path
//! only sets cookies and redirects, and every callback case here fails
//! before the code exchange would start.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use identity_service::build_router;
use tower::util::ServiceExt;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn unknown_provider_is_not_found() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/github")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn password_provider_is_not_an_oauth_provider() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/email")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn authorize_redirects_with_state_and_cookies() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/google?account_type=consultant&redirect_uri=http://localhost:3000/done")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let location = response.headers()["location"].to_str().unwrap();
    assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth"));
    assert!(location.contains("client_id=test-google-client"));
    assert!(location.contains("response_type=code"));
    assert!(location.contains("state="));

    let cookies: Vec<_> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|c| c.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("oauth_state=")));
    assert!(cookies.iter().any(|c| c.starts_with("oauth_passthrough=")));
    // Bounded lifetime, not a session cookie.
    assert!(cookies.iter().all(|c| c.contains("Max-Age=")));
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));

    // The state in the URL matches the state cookie.
    let url_state = location
        .split("state=")
        .nth(1)
        .unwrap()
        .split('&')
        .next()
        .unwrap();
    let cookie_state = cookies
        .iter()
        .find(|c| c.starts_with("oauth_state="))
        .unwrap()
        .trim_start_matches("oauth_state=")
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert_eq!(url_state, cookie_state);
}

#[tokio::test]
async fn microsoft_authorize_uses_tenant_endpoint() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/microsoft")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers()["location"].to_str().unwrap();
    assert!(location
        .starts_with("https://login.microsoftonline.com/test-tenant/oauth2/v2.0/authorize"));
}

#[tokio::test]
async fn callback_with_mismatched_state_fails_closed() {
    let app = build_router(common::lazy_test_state());

    // A forged state parameter must be rejected before any exchange: this
    // test passes without any network or database behind it.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/google/callback?state=forged&code=abc")
                .header(header::COOKIE, "oauth_state=expected")
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
async fn callback_without_state_cookie_fails_closed() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/google/callback?state=whatever&code=abc")
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
async fn callback_surfaces_provider_error() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/google/callback?state=abc&error=access_denied&error_description=denied")
                .header(header::COOKIE, "oauth_state=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "upstream_error");
}

#[tokio::test]
async fn callback_without_code_is_invalid_request() {
    let app = build_router(common::lazy_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/oauth/google/callback?state=abc")
                .header(header::COOKIE, "oauth_state=abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_request");
}
