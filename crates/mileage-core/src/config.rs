//! Configuration resolution for Mileage.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/mileage/settings.json`)
//! 3. Environment variables (`MILEAGE_*`)
//!
//! After resolution the required settings are validated; every missing
//! variable is reported in a single error so startup can abort with a
//! complete description.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const ENV_AUTH_DOMAIN: &str = "MILEAGE_AUTH_DOMAIN";
pub const ENV_AUTH_CLIENT_ID: &str = "MILEAGE_AUTH_CLIENT_ID";
pub const ENV_AUTH_AUDIENCE: &str = "MILEAGE_AUTH_AUDIENCE";
pub const ENV_AUTH_REDIRECT_URI: &str = "MILEAGE_AUTH_REDIRECT_URI";
pub const ENV_ONBOARDED_CLAIM: &str = "MILEAGE_ONBOARDED_CLAIM";
pub const ENV_API_BASE_URL: &str = "MILEAGE_API_BASE_URL";
pub const ENV_APP_ENV: &str = "MILEAGE_APP_ENV";
pub const ENV_MEDIA_CLOUD_NAME: &str = "MILEAGE_MEDIA_CLOUD_NAME";
pub const ENV_MEDIA_UPLOAD_PRESET: &str = "MILEAGE_MEDIA_UPLOAD_PRESET";
pub const ENV_LOG_LEVEL: &str = "MILEAGE_LOG_LEVEL";

/// Complete Mileage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub identity: IdentitySettings,
    #[serde(default)]
    pub media: MediaSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub environment: Option<AppEnvironment>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            identity: IdentitySettings::default(),
            media: MediaSettings::default(),
            cache: CacheSettings::default(),
            environment: None,
            log_level: default_log_level(),
        }
    }
}

/// Backend REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Timeout for authenticated calls (seconds).
    pub request_timeout_secs: u64,
    /// Timeout for the unauthenticated default client (seconds).
    pub default_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout_secs: 10,
            default_timeout_secs: 100,
        }
    }
}

impl ApiSettings {
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

/// Identity provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    pub domain: String,
    pub client_id: String,
    pub audience: String,
    /// Where the provider sends the authorization code.
    pub redirect_uri: String,
    /// Custom claim that is `true` once the member finished onboarding.
    pub onboarded_claim: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            domain: String::new(),
            client_id: String::new(),
            audience: String::new(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            onboarded_claim: "https://mileage.app/onboarded".to_string(),
        }
    }
}

/// Third-party media host settings (unsigned uploads).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MediaSettings {
    pub cloud_name: String,
    pub upload_preset: String,
}

/// Query cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// How long fetched data counts as fresh (seconds).
    pub stale_time_secs: u64,
    /// How long unused entries are kept before collection (seconds).
    pub gc_time_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_time_secs: 30,
            gc_time_secs: 5 * 60,
        }
    }
}

/// Deployment environment tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Staging,
    Production,
}

impl FromStr for AppEnvironment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(Error::Config(format!(
                "{ENV_APP_ENV} must be development, staging or production (got {other:?})"
            ))),
        }
    }
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        })
    }
}

impl Config {
    /// Check that every required setting is present.
    ///
    /// Reports all missing variables at once.
    pub fn validate(&self) -> Result<()> {
        let required = [
            (ENV_AUTH_DOMAIN, self.identity.domain.as_str()),
            (ENV_AUTH_CLIENT_ID, self.identity.client_id.as_str()),
            (ENV_AUTH_AUDIENCE, self.identity.audience.as_str()),
            (ENV_API_BASE_URL, self.api.base_url.as_str()),
            (ENV_MEDIA_CLOUD_NAME, self.media.cloud_name.as_str()),
            (ENV_MEDIA_UPLOAD_PRESET, self.media.upload_preset.as_str()),
        ];
        let mut missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| (*name).to_string())
            .collect();
        if self.environment.is_none() {
            missing.push(ENV_APP_ENV.to_string());
        }
        if !missing.is_empty() {
            return Err(Error::MissingEnv(missing));
        }

        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "{ENV_API_BASE_URL} must be an http(s) URL (got {:?})",
                self.api.base_url
            )));
        }
        if self.api.request_timeout_secs == 0 || self.api.default_timeout_secs == 0 {
            return Err(Error::Config("request timeouts must be non-zero".into()));
        }
        Ok(())
    }
}

/// Load configuration from defaults, the global settings file and the
/// process environment, then validate it.
pub fn load_config() -> Result<Config> {
    load_config_with(global_config_path().as_deref(), |key| std::env::var(key).ok())
}

/// Load configuration from an explicit settings file and environment lookup.
///
/// A missing settings file is not an error.
pub fn load_config_with<F>(settings_path: Option<&Path>, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match settings_path {
        Some(path) if path.exists() => load_config_file(path)?,
        _ => Config::default(),
    };
    apply_env_overrides(&mut config, &env)?;
    config.validate()?;
    Ok(config)
}

/// Get the global settings file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("mileage").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!(
            "Failed to parse config file {}: {}",
            path.display(),
            e
        ))
    })
}

fn apply_env_overrides<F>(config: &mut Config, env: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let string_overrides: [(&str, &mut String); 9] = [
        (ENV_AUTH_DOMAIN, &mut config.identity.domain),
        (ENV_AUTH_CLIENT_ID, &mut config.identity.client_id),
        (ENV_AUTH_AUDIENCE, &mut config.identity.audience),
        (ENV_AUTH_REDIRECT_URI, &mut config.identity.redirect_uri),
        (ENV_ONBOARDED_CLAIM, &mut config.identity.onboarded_claim),
        (ENV_API_BASE_URL, &mut config.api.base_url),
        (ENV_MEDIA_CLOUD_NAME, &mut config.media.cloud_name),
        (ENV_MEDIA_UPLOAD_PRESET, &mut config.media.upload_preset),
        (ENV_LOG_LEVEL, &mut config.log_level),
    ];
    for (key, slot) in string_overrides {
        if let Some(val) = env(key) {
            *slot = val.trim().to_string();
        }
    }
    config.api.base_url = config.api.base_url.trim_end_matches('/').to_string();

    if let Some(val) = env(ENV_APP_ENV) {
        if !val.trim().is_empty() {
            config.environment = Some(val.parse()?);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (ENV_AUTH_DOMAIN, "login.mileage.test"),
            (ENV_AUTH_CLIENT_ID, "client-123"),
            (ENV_AUTH_AUDIENCE, "https://api.mileage.test"),
            (ENV_API_BASE_URL, "https://api.mileage.test/"),
            (ENV_APP_ENV, "staging"),
            (ENV_MEDIA_CLOUD_NAME, "mileage-media"),
            (ENV_MEDIA_UPLOAD_PRESET, "unsigned_docs"),
        ])
    }

    fn lookup(env: HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        move |k| env.get(k).map(|v| (*v).to_string())
    }

    #[test]
    fn complete_env_loads() {
        let config = load_config_with(None, lookup(full_env())).unwrap();
        assert_eq!(config.identity.domain, "login.mileage.test");
        assert_eq!(config.environment, Some(AppEnvironment::Staging));
        assert_eq!(config.api.base_url, "https://api.mileage.test");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.api.default_timeout(), Duration::from_secs(100));
    }

    #[test]
    fn missing_variables_are_all_reported() {
        let mut env = full_env();
        env.remove(ENV_AUTH_CLIENT_ID);
        env.remove(ENV_MEDIA_UPLOAD_PRESET);
        env.remove(ENV_APP_ENV);
        let err = load_config_with(None, lookup(env)).unwrap_err();
        match err {
            Error::MissingEnv(names) => {
                assert_eq!(
                    names,
                    vec![ENV_AUTH_CLIENT_ID, ENV_MEDIA_UPLOAD_PRESET, ENV_APP_ENV]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        let mut env = full_env();
        env.insert(ENV_AUTH_DOMAIN, "   ");
        let err = load_config_with(None, lookup(env)).unwrap_err();
        assert!(matches!(err, Error::MissingEnv(ref n) if n == &vec![ENV_AUTH_DOMAIN.to_string()]));
    }

    #[test]
    fn unknown_environment_tag_rejected() {
        let mut env = full_env();
        env.insert(ENV_APP_ENV, "qa");
        let err = load_config_with(None, lookup(env)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn non_http_base_url_rejected() {
        let mut env = full_env();
        env.insert(ENV_API_BASE_URL, "ftp://api.mileage.test");
        let err = load_config_with(None, lookup(env)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn settings_file_provides_values_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "api": {"base_url": "https://file.test", "request_timeout_secs": 5, "default_timeout_secs": 50},
                "identity": {
                    "domain": "file-domain",
                    "client_id": "file-client",
                    "audience": "file-aud",
                    "redirect_uri": "http://localhost:9000/callback",
                    "onboarded_claim": "https://file.test/onboarded"
                },
                "media": {"cloud_name": "file-cloud", "upload_preset": "file-preset"},
                "environment": "production"
            }"#,
        )
        .unwrap();

        let env = HashMap::from([(ENV_AUTH_DOMAIN, "env-domain")]);
        let config = load_config_with(Some(&path), lookup(env)).unwrap();
        assert_eq!(config.identity.domain, "env-domain");
        assert_eq!(config.identity.client_id, "file-client");
        assert_eq!(config.api.request_timeout_secs, 5);
        assert_eq!(config.environment, Some(AppEnvironment::Production));
        assert_eq!(config.cache.stale_time_secs, 30);
    }

    #[test]
    fn unreadable_settings_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_config_with(Some(&path), lookup(full_env())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn default_cache_settings() {
        let cache = CacheSettings::default();
        assert_eq!(cache.stale_time_secs, 30);
        assert_eq!(cache.gc_time_secs, 300);
    }
}
