//! Per-invocation wiring: configuration, stored credentials and the clients
//! built from them.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use mileage_client::auth::{IdentityClient, OAuthTokenProvider};
use mileage_client::error::describe_fields;
use mileage_client::guard::{GuardDecision, RouteKind, SessionGuard, Surface, UnauthorizedReaction};
use mileage_client::media::MediaUploader;
use mileage_client::{ApiClient, ApiError, CacheConfig};
use mileage_core::Config;

use crate::config::Credentials;

pub struct AppContext {
    pub config: Config,
    pub credentials: Arc<Mutex<Credentials>>,
    credentials_path: Option<PathBuf>,
}

impl AppContext {
    pub fn new(config: Config, credentials: Credentials, credentials_path: Option<PathBuf>) -> Self {
        Self {
            config,
            credentials: Arc::new(Mutex::new(credentials)),
            credentials_path,
        }
    }

    /// Context over the default credentials file.
    pub fn load(config: Config) -> Self {
        Self::new(config, Credentials::load(), Credentials::path())
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace and persist the stored credentials.
    pub fn store_credentials(&self, credentials: Credentials) -> anyhow::Result<()> {
        if let Some(path) = &self.credentials_path {
            credentials.save_to(path)?;
        }
        *self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = credentials;
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from(&self.config.cache)
    }

    pub fn guard(&self) -> SessionGuard {
        SessionGuard::new(self.config.identity.onboarded_claim.clone())
    }

    pub fn identity(&self) -> anyhow::Result<IdentityClient> {
        Ok(IdentityClient::new(
            &self.config.identity,
            self.config.api.default_timeout(),
        )?)
    }

    pub fn media(&self) -> anyhow::Result<MediaUploader> {
        Ok(MediaUploader::new(
            &self.config.media,
            self.config.api.default_timeout(),
        )?)
    }

    /// Check the session before entering a screen of the given kind.
    pub fn require(&self, route: RouteKind) -> anyhow::Result<()> {
        match self.guard().evaluate(&self.credentials().session(), route) {
            GuardDecision::Allow => Ok(()),
            GuardDecision::RedirectToLogin => {
                anyhow::bail!("Not signed in. Run `mileage auth login` first.")
            }
            GuardDecision::RedirectToOnboarding => {
                anyhow::bail!("Your account is not set up yet. Run `mileage member onboard` first.")
            }
            GuardDecision::RedirectToHome => anyhow::bail!("Your account is already set up."),
        }
    }

    /// Authenticated backend client. Renewed tokens are written back to the
    /// credentials file.
    pub fn api(&self) -> anyhow::Result<ApiClient> {
        let creds = self.credentials();
        let tokens = creds
            .tokens
            .ok_or_else(|| anyhow::anyhow!("Not signed in. Run `mileage auth login` first."))?;

        let shared = Arc::clone(&self.credentials);
        let path = self.credentials_path.clone();
        let provider = OAuthTokenProvider::new(self.identity()?, tokens).on_renew(move |renewed| {
            let mut creds = shared.lock().unwrap_or_else(PoisonError::into_inner);
            creds.tokens = Some(renewed.clone());
            if let Some(path) = &path {
                if let Err(e) = creds.save_to(path) {
                    warn!(error = %e, "Failed to persist renewed tokens");
                }
            }
        });
        Ok(ApiClient::from_settings(
            &self.config.api,
            provider.into_shared(),
        )?)
    }

    /// Turn an API failure into the surface's reaction. A member whose session
    /// is gone is signed out.
    pub fn handle_api_error(&self, surface: Surface, err: ApiError) -> anyhow::Error {
        match SessionGuard::on_unauthorized(surface, &err) {
            Some(UnauthorizedReaction::RedirectToLogin) => {
                let mut creds = self.credentials();
                creds.clear();
                if let Err(e) = self.store_credentials(creds) {
                    warn!(error = %e, "Failed to clear credentials");
                }
                anyhow::anyhow!("Your session has ended. Run `mileage auth login` to sign in again.")
            }
            Some(UnauthorizedReaction::Toast(message)) => anyhow::anyhow!(message),
            None => {
                let detail = err.fields.as_ref().map(describe_fields).unwrap_or_default();
                if detail.is_empty() {
                    err.into()
                } else {
                    anyhow::anyhow!("{err}\n  {}", detail.join("\n  "))
                }
            }
        }
    }
}
