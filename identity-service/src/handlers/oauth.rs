//! OAuth authorize and callback endpoints.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::str::FromStr;

use crate::models::{AccountType, IdentityProvider, LoginResponse};
use crate::services::oauth::{CallbackQuery, OAuthService, PASSTHROUGH_COOKIE, STATE_COOKIE};
use crate::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub account_type: Option<String>,
    pub redirect_uri: Option<String>,
}

fn parse_provider(raw: &str) -> Result<IdentityProvider, AppError> {
    match IdentityProvider::from_str(raw) {
        Ok(provider) if provider.is_oauth() => Ok(provider),
        _ => Err(AppError::not_found(
            "not_found",
            anyhow::anyhow!("Unknown OAuth provider"),
        )),
    }
}

/// GET /oauth/:provider
///
/// Sets the state and passthrough cookies, then redirects to the provider.
#[tracing::instrument(skip_all, fields(provider = %provider))]
pub async fn authorize(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<AuthorizeQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&provider)?;

    let passthrough = serde_json::json!({
        "account_type": query.account_type,
        "redirect_uri": query.redirect_uri,
    });

    let state_token = OAuthService::generate_state();
    let url = state.oauth.authorize_url(provider, &state_token)?;

    let ttl = time::Duration::seconds(state.oauth.state_ttl_seconds());
    let jar = jar
        .add(flow_cookie(STATE_COOKIE, state_token, ttl))
        .add(flow_cookie(
            PASSTHROUGH_COOKIE,
            OAuthService::encode_passthrough(&passthrough),
            ttl,
        ));

    Ok((jar, Redirect::temporary(&url)))
}

fn flow_cookie(name: &'static str, value: String, ttl: time::Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(ttl)
        .build()
}

/// GET /oauth/:provider/callback
///
/// Validates state, exchanges the code, reconciles the identity and
/// redirects to the caller-supplied URI with the encoded login payload.
#[tracing::instrument(skip_all, fields(provider = %provider))]
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&provider)?;

    let state_cookie = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let passthrough_cookie = jar.get(PASSTHROUGH_COOKIE).map(|c| c.value().to_string());

    let result = state
        .oauth
        .callback(
            provider,
            state_cookie.as_deref(),
            passthrough_cookie.as_deref(),
            &query,
        )
        .await?;

    let (requested_type, redirect_uri) = parse_passthrough(result.passthrough.as_ref());

    let response = state.reconciler.oauth_login(&result, requested_type).await?;

    // Flow state is single-use; drop both cookies with the response. The
    // removal cookies must carry the same path they were set with.
    let jar = jar
        .remove(Cookie::build(STATE_COOKIE).path("/").build())
        .remove(Cookie::build(PASSTHROUGH_COOKIE).path("/").build());

    let location = result_redirect(&redirect_uri, &response)?;
    Ok((jar, Redirect::temporary(&location)))
}

/// Passthrough is opaque caller context: it may pick an account type from
/// the closed set and a redirect target, nothing more.
fn parse_passthrough(passthrough: Option<&serde_json::Value>) -> (AccountType, String) {
    let account_type = passthrough
        .and_then(|v| v.get("account_type"))
        .and_then(|v| v.as_str())
        .and_then(|s| AccountType::from_str(s).ok())
        .unwrap_or(AccountType::Regular);

    let redirect_uri = passthrough
        .and_then(|v| v.get("redirect_uri"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("/")
        .to_string();

    (account_type, redirect_uri)
}

/// Append the encoded login payload to the redirect target as the
/// `oauth_r` query parameter.
fn result_redirect(redirect_uri: &str, response: &LoginResponse) -> Result<String, AppError> {
    let payload = serde_json::to_vec(response)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode result: {}", e)))?;
    let encoded = URL_SAFE_NO_PAD.encode(payload);

    match url::Url::parse(redirect_uri) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("oauth_r", &encoded);
            Ok(url.into())
        }
        // Relative target: keep it relative, the frontend owns the host.
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let separator = if redirect_uri.contains('?') { '&' } else { '?' };
            Ok(format!("{}{}oauth_r={}", redirect_uri, separator, encoded))
        }
        Err(e) => Err(AppError::BadRequest(anyhow::anyhow!(
            "Invalid redirect URI: {}",
            e
        ))),
    }
}
