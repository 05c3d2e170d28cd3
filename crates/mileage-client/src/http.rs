//! Backend REST client.
//!
//! Uses reqwest to call the loyalty API. Every request aimed at the backend
//! base URL carries a bearer token from a [`TokenProvider`]; a 401 triggers
//! one forced token refresh and exactly one retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use mileage_core::config::ApiSettings;

use crate::error::ApiError;

/// Source of bearer tokens for the backend.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a usable access token. With `force_refresh` the provider must
    /// not return its cached token.
    async fn access_token(&self, force_refresh: bool) -> Result<String, ApiError>;
}

/// A fixed token, e.g. one passed on the command line.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self, _force_refresh: bool) -> Result<String, ApiError> {
        Ok(self.0.clone())
    }
}

/// Query string pairs; `None` values are dropped.
pub type QueryPairs = Vec<(&'static str, String)>;

/// Loyalty REST API client.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Option<Arc<dyn TokenProvider>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Authenticated client.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ApiError> {
        Self::build(base_url, timeout, Some(tokens))
    }

    /// Default client without token attachment.
    pub fn unauthenticated(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Self::build(base_url, timeout, None)
    }

    /// Authenticated client using the configured 10 s request timeout.
    pub fn from_settings(
        settings: &ApiSettings,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ApiError> {
        Self::new(&settings.base_url, settings.request_timeout(), tokens)
    }

    fn build(
        base_url: &str,
        timeout: Duration,
        tokens: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self, ApiError> {
        if base_url.is_empty() {
            return Err(ApiError::config("base_url is empty"));
        }
        install_crypto_provider();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::config(format!("Failed to build HTTP client: {e}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the absolute URL for an API path such as `/api/v1/profile`.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Whether the URL points at the backend (and may carry the bearer token).
    pub(crate) fn targets_backend(&self, url: &str) -> bool {
        url.strip_prefix(&self.base_url)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &QueryPairs,
    ) -> Result<T, ApiError> {
        let resp = self.execute(Method::GET, path, query, None).await?;
        decode(resp).await
    }

    pub async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = to_body(body)?;
        let resp = self.execute(Method::POST, path, &Vec::new(), Some(body)).await?;
        decode(resp).await
    }

    pub async fn patch<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = to_body(body)?;
        let resp = self.execute(Method::PATCH, path, &Vec::new(), Some(body)).await?;
        decode(resp).await
    }

    /// `PATCH` whose response body is ignored.
    pub async fn patch_no_content(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(), ApiError> {
        self.execute(Method::PATCH, path, &Vec::new(), body).await?;
        Ok(())
    }

    /// Send a request, recovering once from a 401 by forcing a token refresh.
    #[instrument(skip(self, query, body))]
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &QueryPairs,
        body: Option<serde_json::Value>,
    ) -> Result<Response, ApiError> {
        let url = self.api_url(path);
        let mut resp = self
            .send_once(&method, &url, query, body.as_ref(), false)
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED && self.tokens.is_some() {
            warn!(path, "Received 401, refreshing token and retrying once");
            resp = self
                .send_once(&method, &url, query, body.as_ref(), true)
                .await?;
        }

        let status = resp.status();
        if !status.is_success() {
            let err = ApiError::from_response(resp).await;
            debug!(status = status.as_u16(), code = %err.code, "API request failed");
            return Err(err);
        }
        Ok(resp)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        query: &QueryPairs,
        body: Option<&serde_json::Value>,
        force_refresh: bool,
    ) -> Result<Response, ApiError> {
        let mut req = self.http.request(method.clone(), url);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        if let Some(tokens) = &self.tokens {
            if self.targets_backend(url) {
                let token = tokens.access_token(force_refresh).await?;
                req = req.bearer_auth(token);
            }
        }
        req.send().await.map_err(|e| ApiError::from_transport(&e))
    }
}

/// Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
/// The `Err` case just means it was already installed.
pub(crate) fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

fn to_body<B: Serialize>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::decode(format!("Failed to encode body: {e}")))
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ApiError::from_transport(&e))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::decode(format!("Unexpected response body: {e}")))
}

/// Append `(name, value)` when the value is present and non-blank.
pub(crate) fn push_opt<V: ToString>(query: &mut QueryPairs, name: &'static str, value: Option<V>) {
    if let Some(v) = value {
        let v = v.to_string();
        if !v.trim().is_empty() {
            query.push((name, v.trim().to_string()));
        }
    }
}
