//! Identity provider integration.
//!
//! Authorization-code redirect flow (`/authorize` then the `/callback`
//! code exchange), refresh-token renewal and the `/userinfo` claims used by
//! the session guard. [`OAuthTokenProvider`] plugs the provider into the
//! HTTP client as its [`TokenProvider`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use mileage_core::config::IdentitySettings;

use crate::error::ApiError;
use crate::http::{TokenProvider, install_crypto_provider};

/// Scopes requested at login; `offline_access` yields a refresh token.
pub const LOGIN_SCOPE: &str = "openid profile email offline_access";

/// Renew this long before the access token expires.
const RENEW_MARGIN_SECS: i64 = 60;

/// Tokens held for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Whether the access token is expired or about to expire.
    pub fn needs_renewal(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(RENEW_MARGIN_SECS) <= now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

const fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn into_token_set(self, now: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            expires_at: now + chrono::Duration::seconds(self.expires_in),
        }
    }
}

/// Claims returned by `/userinfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserClaims(pub Map<String, Value>);

impl UserClaims {
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(Value::as_str)
    }

    /// Whether the custom onboarding claim is set to `true`.
    pub fn is_onboarded(&self, claim: &str) -> bool {
        matches!(self.0.get(claim), Some(Value::Bool(true)))
    }
}

/// Client for the third-party identity provider.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    issuer: String,
    settings: IdentitySettings,
}

impl IdentityClient {
    pub fn new(settings: &IdentitySettings, timeout: Duration) -> Result<Self, ApiError> {
        if settings.domain.trim().is_empty() {
            return Err(ApiError::config("identity domain is empty"));
        }
        if settings.client_id.trim().is_empty() {
            return Err(ApiError::config("identity client id is empty"));
        }
        install_crypto_provider();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::config(format!("Failed to build HTTP client: {e}")))?;

        let domain = settings.domain.trim().trim_end_matches('/');
        let issuer = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        Ok(Self {
            http,
            issuer,
            settings: settings.clone(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub const fn settings(&self) -> &IdentitySettings {
        &self.settings
    }

    /// Random value to bind the redirect to this login attempt.
    pub fn new_state() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    /// Where to send the user to sign in.
    pub fn authorize_url(&self, state: &str) -> Result<String, ApiError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/authorize", self.issuer),
            &[
                ("response_type", "code"),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("audience", self.settings.audience.as_str()),
                ("scope", LOGIN_SCOPE),
                ("state", state),
            ],
        )
        .map_err(|e| ApiError::config(format!("Invalid identity domain: {e}")))?;
        Ok(url.into())
    }

    /// Exchange the code delivered to the `/callback` route for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, ApiError> {
        if code.trim().is_empty() {
            return Err(ApiError::unauthorized("Authorization code is empty"));
        }
        let tokens = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.settings.client_id.as_str()),
                ("code", code.trim()),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
            ])
            .await?;
        info!("Exchanged authorization code for tokens");
        Ok(tokens)
    }

    /// Silent renewal with a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ApiError> {
        let tokens = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.settings.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .await?;
        debug!(expires_at = %tokens.expires_at, "Access token renewed");
        Ok(tokens)
    }

    /// Claims for the signed-in user.
    pub async fn user_claims(&self, access_token: &str) -> Result<UserClaims, ApiError> {
        let resp = self
            .http
            .get(format!("{}/userinfo", self.issuer))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;
        if !resp.status().is_success() {
            return Err(ApiError::from_response(resp).await);
        }
        resp.json()
            .await
            .map_err(|e| ApiError::decode(format!("Unexpected userinfo body: {e}")))
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenSet, ApiError> {
        let resp = self
            .http
            .post(format!("{}/oauth/token", self.issuer))
            .form(params)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;
        if !resp.status().is_success() {
            let err = ApiError::from_response(resp).await;
            warn!(code = %err.code, "Token endpoint rejected the request");
            // Any client error here means the grant is unusable: sign in again.
            if err.status.is_some_and(|s| (400..500).contains(&s)) {
                return Err(ApiError {
                    kind: crate::error::ErrorKind::Unauthorized,
                    ..err
                });
            }
            return Err(err);
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::decode(format!("Unexpected token response: {e}")))?;
        Ok(body.into_token_set(Utc::now()))
    }
}

type RenewHook = Box<dyn Fn(&TokenSet) + Send + Sync>;

/// Token provider backed by the identity provider.
///
/// Caches the access token and renews it silently shortly before expiry or
/// when the HTTP layer forces a refresh after a 401. Concurrent callers share
/// a single renewal.
pub struct OAuthTokenProvider {
    identity: IdentityClient,
    tokens: Mutex<TokenSet>,
    on_renew: Option<RenewHook>,
}

impl OAuthTokenProvider {
    pub fn new(identity: IdentityClient, tokens: TokenSet) -> Self {
        Self {
            identity,
            tokens: Mutex::new(tokens),
            on_renew: None,
        }
    }

    /// Called with the new tokens after every renewal (e.g. to persist them).
    #[must_use]
    pub fn on_renew(mut self, hook: impl Fn(&TokenSet) + Send + Sync + 'static) -> Self {
        self.on_renew = Some(Box::new(hook));
        self
    }

    pub fn into_shared(self) -> Arc<dyn TokenProvider> {
        Arc::new(self)
    }

    pub async fn current(&self) -> TokenSet {
        self.tokens.lock().await.clone()
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn access_token(&self, force_refresh: bool) -> Result<String, ApiError> {
        let mut tokens = self.tokens.lock().await;
        if !force_refresh && !tokens.needs_renewal(Utc::now()) {
            return Ok(tokens.access_token.clone());
        }

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            return Err(ApiError::unauthorized(
                "Session expired, please sign in again",
            ));
        };
        let mut renewed = self.identity.refresh(&refresh_token).await?;
        if renewed.refresh_token.is_none() {
            renewed.refresh_token = Some(refresh_token);
        }
        if let Some(hook) = &self.on_renew {
            hook(&renewed);
        }
        *tokens = renewed;
        Ok(tokens.access_token.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn settings() -> IdentitySettings {
        IdentitySettings {
            domain: "login.mileage.test".into(),
            client_id: "client-123".into(),
            audience: "https://api.mileage.test".into(),
            ..Default::default()
        }
    }

    #[test]
    fn authorize_url_carries_flow_parameters() {
        let client = IdentityClient::new(&settings(), Duration::from_secs(5)).unwrap();
        let url = reqwest::Url::parse(&client.authorize_url("xyz").unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("login.mileage.test"));
        assert_eq!(url.path(), "/authorize");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["audience"], "https://api.mileage.test");
        assert_eq!(pairs["redirect_uri"], "http://localhost:3000/callback");
        assert_eq!(pairs["state"], "xyz");
        assert!(pairs["scope"].contains("offline_access"));
    }

    #[test]
    fn empty_domain_is_config_error() {
        let mut s = settings();
        s.domain = String::new();
        assert!(IdentityClient::new(&s, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn renewal_window() {
        let now = Utc::now();
        let fresh = TokenSet {
            access_token: "a".into(),
            refresh_token: None,
            id_token: None,
            expires_at: now + chrono::Duration::seconds(3600),
        };
        assert!(!fresh.needs_renewal(now));
        let expiring = TokenSet {
            expires_at: now + chrono::Duration::seconds(30),
            ..fresh
        };
        assert!(expiring.needs_renewal(now));
    }

    #[test]
    fn onboarded_claim_must_be_true() {
        let claims: UserClaims = serde_json::from_str(
            r#"{"sub":"auth0|1","https://mileage.app/onboarded":true}"#,
        )
        .unwrap();
        assert_eq!(claims.subject(), Some("auth0|1"));
        assert!(claims.is_onboarded("https://mileage.app/onboarded"));

        let claims: UserClaims =
            serde_json::from_str(r#"{"sub":"auth0|1","https://mileage.app/onboarded":"yes"}"#)
                .unwrap();
        assert!(!claims.is_onboarded("https://mileage.app/onboarded"));
    }

    #[tokio::test]
    async fn missing_refresh_token_is_unauthorized() {
        let identity = IdentityClient::new(&settings(), Duration::from_secs(5)).unwrap();
        let provider = OAuthTokenProvider::new(
            identity,
            TokenSet {
                access_token: "old".into(),
                refresh_token: None,
                id_token: None,
                expires_at: Utc::now() + chrono::Duration::seconds(3600),
            },
        );
        assert_eq!(provider.access_token(false).await.unwrap(), "old");
        let err = provider.access_token(true).await.unwrap_err();
        assert!(err.is_unauthorized());
    }
}
