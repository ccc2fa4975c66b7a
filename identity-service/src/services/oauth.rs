//! OAuth flow manager: authorization redirects, anti-forgery state,
//! passthrough cookies, code exchange and provider profile normalization.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::Deserialize;
use std::time::Duration;

use crate::config::OAuthConfig;
use crate::models::IdentityProvider;
use service_core::error::AppError;

pub const STATE_COOKIE: &str = "oauth_state";
pub const PASSTHROUGH_COOKIE: &str = "oauth_passthrough";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const GOOGLE_SCOPES: &str = "https://www.googleapis.com/auth/userinfo.email";

const MICROSOFT_GRAPH_ME_URL: &str = "https://graph.microsoft.com/v1.0/me";
const MICROSOFT_SCOPES: &str = "openid User.Read";

/// What a completed callback resolves to, provider differences normalized
/// away.
#[derive(Debug, Clone)]
pub struct OAuthResult {
    pub provider: IdentityProvider,
    pub external_id: String,
    pub email: String,
    /// Opaque caller context preserved across the redirect round-trip.
    /// Never trusted for anything security-relevant.
    pub passthrough: Option<serde_json::Value>,
}

/// Query parameters the provider sends to the callback endpoint.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleProfile {
    id: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MicrosoftProfile {
    id: Option<String>,
    mail: Option<String>,
}

#[derive(Clone)]
pub struct OAuthService {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthService {
    pub fn new(config: OAuthConfig) -> Result<Self, AppError> {
        // A stalled provider must not hold a request open indefinitely.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { config, http })
    }

    pub fn state_ttl_seconds(&self) -> i64 {
        self.config.state_ttl_seconds as i64
    }

    /// Random opaque token binding the authorize redirect to its callback.
    pub fn generate_state() -> String {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn encode_passthrough(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    pub fn decode_passthrough(raw: &str) -> Result<serde_json::Value, AppError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid passthrough cookie: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid passthrough cookie: {}", e)))
    }

    /// Provider authorization URL embedding the state token and scopes.
    pub fn authorize_url(
        &self,
        provider: IdentityProvider,
        state: &str,
    ) -> Result<String, AppError> {
        let (auth_url, client_id, redirect_uri, scopes) = match provider {
            IdentityProvider::Google => (
                GOOGLE_AUTH_URL.to_string(),
                self.config.google.client_id.as_str(),
                self.config.google.redirect_uri.as_str(),
                GOOGLE_SCOPES,
            ),
            IdentityProvider::Microsoft => (
                format!(
                    "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize",
                    self.config.microsoft.tenant_id
                ),
                self.config.microsoft.client_id.as_str(),
                self.config.microsoft.redirect_uri.as_str(),
                MICROSOFT_SCOPES,
            ),
            IdentityProvider::Email => {
                return Err(AppError::not_found(
                    "not_found",
                    anyhow::anyhow!("Not an OAuth provider"),
                ))
            }
        };

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(scopes),
            urlencoding::encode(state),
        ))
    }

    /// Resolve a provider callback into a normalized result.
    ///
    /// The state comparison runs first and fails closed: nothing is
    /// exchanged until the cookie and the `state` query parameter agree
    /// byte-for-byte.
    pub async fn callback(
        &self,
        provider: IdentityProvider,
        state_cookie: Option<&str>,
        passthrough_cookie: Option<&str>,
        query: &CallbackQuery,
    ) -> Result<OAuthResult, AppError> {
        let expected = state_cookie.filter(|s| !s.is_empty()).ok_or_else(|| {
            AppError::InvalidCredentials(anyhow::anyhow!("Missing OAuth state cookie"))
        })?;
        let presented = query.state.as_deref().unwrap_or("");
        if presented.as_bytes() != expected.as_bytes() {
            return Err(AppError::InvalidCredentials(anyhow::anyhow!(
                "OAuth state mismatch"
            )));
        }

        if let Some(error) = &query.error {
            let detail = query
                .error_description
                .clone()
                .unwrap_or_else(|| error.clone());
            return Err(AppError::UpstreamProvider(anyhow::anyhow!(
                "Provider reported an error: {}",
                detail
            )));
        }

        let code = query
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing authorization code")))?;

        let access_token = self.exchange_code(provider, code).await?;
        let (external_id, email) = self.fetch_profile(provider, &access_token).await?;

        let passthrough = match passthrough_cookie {
            Some(raw) if !raw.is_empty() => Some(Self::decode_passthrough(raw)?),
            _ => None,
        };

        Ok(OAuthResult {
            provider,
            external_id,
            email,
            passthrough,
        })
    }

    /// Exchange the authorization code for a provider access token.
    async fn exchange_code(
        &self,
        provider: IdentityProvider,
        code: &str,
    ) -> Result<String, AppError> {
        let (token_url, client_id, client_secret, redirect_uri) = match provider {
            IdentityProvider::Google => (
                GOOGLE_TOKEN_URL.to_string(),
                self.config.google.client_id.as_str(),
                self.config.google.client_secret.as_str(),
                self.config.google.redirect_uri.as_str(),
            ),
            IdentityProvider::Microsoft => (
                format!(
                    "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                    self.config.microsoft.tenant_id
                ),
                self.config.microsoft.client_id.as_str(),
                self.config.microsoft.client_secret.as_str(),
                self.config.microsoft.redirect_uri.as_str(),
            ),
            IdentityProvider::Email => {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Not an OAuth provider"
                )))
            }
        };

        let response = self
            .http
            .post(&token_url)
            .form(&[
                ("code", code),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| {
                AppError::UpstreamProvider(anyhow::anyhow!("Token exchange request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, provider = provider.as_str(), "OAuth token exchange failed");
            return Err(AppError::UpstreamProvider(anyhow::anyhow!(
                "Token exchange failed with status {}",
                status
            )));
        }

        let tokens: TokenExchangeResponse = response.json().await.map_err(|e| {
            AppError::UpstreamProvider(anyhow::anyhow!("Malformed token response: {}", e))
        })?;

        Ok(tokens.access_token)
    }

    /// Fetch the provider's user-info endpoint and normalize the response.
    async fn fetch_profile(
        &self,
        provider: IdentityProvider,
        access_token: &str,
    ) -> Result<(String, String), AppError> {
        match provider {
            IdentityProvider::Google => {
                let url = format!("{}?access_token={}", GOOGLE_USERINFO_URL, access_token);
                let profile: GoogleProfile = self.get_json(&url, None).await?;
                normalize_profile(provider, profile.id, profile.email)
            }
            IdentityProvider::Microsoft => {
                let profile: MicrosoftProfile =
                    self.get_json(MICROSOFT_GRAPH_ME_URL, Some(access_token)).await?;
                normalize_profile(provider, profile.id, profile.mail)
            }
            IdentityProvider::Email => Err(AppError::BadRequest(anyhow::anyhow!(
                "Not an OAuth provider"
            ))),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        bearer: Option<&str>,
    ) -> Result<T, AppError> {
        let mut request = self.http.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            AppError::UpstreamProvider(anyhow::anyhow!("User info request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::UpstreamProvider(anyhow::anyhow!(
                "User info request failed with status {}",
                status
            )));
        }

        response.json::<T>().await.map_err(|e| {
            AppError::UpstreamProvider(anyhow::anyhow!("Malformed user info response: {}", e))
        })
    }
}

/// Both the external id and the email are required; reconciliation cannot
/// proceed without either.
fn normalize_profile(
    provider: IdentityProvider,
    id: Option<String>,
    email: Option<String>,
) -> Result<(String, String), AppError> {
    let id = id.filter(|v| !v.is_empty()).ok_or_else(|| {
        AppError::UpstreamProvider(anyhow::anyhow!(
            "Provider {} returned no user id",
            provider.as_str()
        ))
    })?;
    let email = email.filter(|v| !v.is_empty()).ok_or_else(|| {
        AppError::UpstreamProvider(anyhow::anyhow!(
            "Provider {} returned no email",
            provider.as_str()
        ))
    })?;
    Ok((id, email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MicrosoftCredentials, ProviderCredentials};

    fn test_service() -> OAuthService {
        OAuthService::new(OAuthConfig {
            google: ProviderCredentials {
                client_id: "google-client".to_string(),
                client_secret: "google-secret".to_string(),
                redirect_uri: "http://localhost:3000/oauth/google/callback".to_string(),
            },
            microsoft: MicrosoftCredentials {
                client_id: "ms-client".to_string(),
                client_secret: "ms-secret".to_string(),
                redirect_uri: "http://localhost:3000/oauth/microsoft/callback".to_string(),
                tenant_id: "common".to_string(),
            },
            state_ttl_seconds: 900,
            provider_timeout_seconds: 5,
        })
        .unwrap()
    }

    #[test]
    fn state_tokens_are_random_and_urlsafe() {
        let a = OAuthService::generate_state();
        let b = OAuthService::generate_state();
        assert_ne!(a, b);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), 16);
    }

    #[test]
    fn authorize_url_embeds_state_and_credentials() {
        let service = test_service();
        let url = service
            .authorize_url(IdentityProvider::Google, "st4te")
            .unwrap();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=google-client"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=st4te"));
        assert!(url.contains("scope="));
        assert!(!url.contains("google-secret"));
    }

    #[test]
    fn authorize_url_uses_microsoft_tenant() {
        let service = test_service();
        let url = service
            .authorize_url(IdentityProvider::Microsoft, "s")
            .unwrap();
        assert!(url.starts_with("https://login.microsoftonline.com/common/oauth2/v2.0/authorize"));
    }

    #[test]
    fn authorize_url_rejects_password_provider() {
        let service = test_service();
        assert!(service.authorize_url(IdentityProvider::Email, "s").is_err());
    }

    #[test]
    fn passthrough_round_trip() {
        let value = serde_json::json!({"account_type": "consultant", "redirect_uri": "/done"});
        let encoded = OAuthService::encode_passthrough(&value);
        let decoded = OAuthService::decode_passthrough(&encoded).unwrap();
        assert_eq!(decoded, value);

        assert!(OAuthService::decode_passthrough("%%%").is_err());
    }

    #[tokio::test]
    async fn callback_rejects_state_mismatch_before_exchange() {
        let service = test_service();
        let query = CallbackQuery {
            state: Some("forged".to_string()),
            code: Some("code".to_string()),
            error: None,
            error_description: None,
        };

        // Returns before any network request: the test config points at
        // nothing that would answer one.
        let err = service
            .callback(IdentityProvider::Google, Some("expected"), None, &query)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn callback_rejects_missing_state_cookie() {
        let service = test_service();
        let query = CallbackQuery {
            state: Some("anything".to_string()),
            code: Some("code".to_string()),
            error: None,
            error_description: None,
        };

        let err = service
            .callback(IdentityProvider::Google, None, None, &query)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn callback_surfaces_provider_error_after_state_check() {
        let service = test_service();
        let query = CallbackQuery {
            state: Some("st4te".to_string()),
            code: None,
            error: Some("access_denied".to_string()),
            error_description: Some("User denied access".to_string()),
        };

        let err = service
            .callback(IdentityProvider::Google, Some("st4te"), None, &query)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamProvider(_)));
    }

    #[tokio::test]
    async fn callback_requires_authorization_code() {
        let service = test_service();
        let query = CallbackQuery {
            state: Some("st4te".to_string()),
            code: None,
            error: None,
            error_description: None,
        };

        let err = service
            .callback(IdentityProvider::Google, Some("st4te"), None, &query)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn profile_normalization_requires_id_and_email() {
        assert!(normalize_profile(
            IdentityProvider::Google,
            Some("id".to_string()),
            Some("a@x.com".to_string())
        )
        .is_ok());

        assert!(matches!(
            normalize_profile(IdentityProvider::Google, None, Some("a@x.com".to_string())),
            Err(AppError::UpstreamProvider(_))
        ));
        assert!(matches!(
            normalize_profile(IdentityProvider::Google, Some("id".to_string()), None),
            Err(AppError::UpstreamProvider(_))
        ));
        assert!(matches!(
            normalize_profile(
                IdentityProvider::Microsoft,
                Some("id".to_string()),
                Some(String::new())
            ),
            Err(AppError::UpstreamProvider(_))
        ));
    }
}
