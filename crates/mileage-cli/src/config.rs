//! Stored login state.
//!
//! Persists tokens, claims and the pending login `state` to
//! `~/.mileage/credentials.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mileage_client::auth::{TokenSet, UserClaims};
use mileage_client::guard::Session;

/// Persistent CLI login state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// Tokens of the signed-in user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenSet>,
    /// Claims read from `/userinfo` at sign-in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<UserClaims>,
    /// `state` issued by `auth login`, checked by `auth callback`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_state: Option<String>,
}

impl Credentials {
    /// Path to the credentials directory: `~/.mileage/`.
    pub fn dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".mileage"))
    }

    /// Path to the credentials file: `~/.mileage/credentials.json`.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("credentials.json"))
    }

    /// Load from the default location. Missing or unreadable files yield the
    /// signed-out state.
    pub fn load() -> Self {
        Self::path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Forget the signed-in user.
    pub fn clear(&mut self) {
        self.tokens = None;
        self.claims = None;
        self.pending_state = None;
    }

    pub fn session(&self) -> Session {
        Session {
            tokens: self.tokens.clone(),
            claims: self.claims.clone(),
        }
    }
}
