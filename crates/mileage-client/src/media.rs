//! Unsigned uploads to the media host.
//!
//! Ticket images and boarding passes go straight to the media host with an
//! upload preset; the backend only ever sees the resulting URL. These requests
//! never carry the backend bearer token.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, instrument};

use mileage_core::config::MediaSettings;

use crate::error::ApiError;
use crate::http::install_crypto_provider;

const MEDIA_HOST: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Raw,
    #[default]
    Auto,
}

impl ResourceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Raw => "raw",
            Self::Auto => "auto",
        }
    }
}

/// Upload result; only `secure_url` is relied on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedMedia {
    pub secure_url: String,
    #[serde(default)]
    pub public_id: Option<String>,
    #[serde(default)]
    pub bytes: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MediaUploader {
    http: reqwest::Client,
    host: String,
    cloud_name: String,
    upload_preset: String,
}

impl MediaUploader {
    pub fn new(settings: &MediaSettings, timeout: Duration) -> Result<Self, ApiError> {
        Self::with_host(MEDIA_HOST, settings, timeout)
    }

    /// Uploader against a different media host root.
    pub fn with_host(
        host: &str,
        settings: &MediaSettings,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        if settings.cloud_name.trim().is_empty() {
            return Err(ApiError::config("media cloud name is empty"));
        }
        if settings.upload_preset.trim().is_empty() {
            return Err(ApiError::config("media upload preset is empty"));
        }
        install_crypto_provider();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_string(),
            cloud_name: settings.cloud_name.trim().to_string(),
            upload_preset: settings.upload_preset.trim().to_string(),
        })
    }

    pub fn upload_url(&self, resource: ResourceType) -> String {
        format!(
            "{}/{}/{}/upload",
            self.host,
            self.cloud_name,
            resource.as_str()
        )
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        resource: ResourceType,
    ) -> Result<UploadedMedia, ApiError> {
        let form = Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .part("file", Part::bytes(bytes).file_name(file_name.to_string()));

        let resp = self
            .http
            .post(self.upload_url(resource))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;
        if !resp.status().is_success() {
            return Err(ApiError::from_response(resp).await);
        }
        let uploaded: UploadedMedia = resp
            .json()
            .await
            .map_err(|e| ApiError::decode(format!("Unexpected upload response: {e}")))?;
        info!(url = %uploaded.secure_url, "Media uploaded");
        Ok(uploaded)
    }

    pub async fn upload_file(
        &self,
        path: &Path,
        resource: ResourceType,
    ) -> Result<UploadedMedia, ApiError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ApiError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());
        self.upload_bytes(&file_name, bytes, resource).await
    }
}
