//! Normalized API error.
//!
//! Every failure the client can observe (transport, timeout, HTTP status,
//! undecodable body, cancelled fetch) is folded into one `ApiError` with a
//! `code`/`message`/`fields` shape, so callers handle errors uniformly no
//! matter which endpoint failed.

use std::collections::BTreeMap;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use mileage_core::error::FieldErrors;

/// Broad category of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    Client,
    Server,
    Decode,
    Cancelled,
    Config,
}

/// Uniform `{code, message, fields?}` error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} ({code})")]
pub struct ApiError {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: code.into(),
            message: message.into(),
            fields: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "CANCELLED", "Request was cancelled")
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, "CONFIG", message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, "DECODE_ERROR", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: Some(StatusCode::UNAUTHORIZED.as_u16()),
            ..Self::new(ErrorKind::Unauthorized, "UNAUTHORIZED", message)
        }
    }

    pub const fn is_unauthorized(&self) -> bool {
        matches!(self.kind, ErrorKind::Unauthorized)
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Transport failure (no HTTP response).
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorKind::Timeout, "TIMEOUT", "The server took too long to respond")
        } else if err.is_decode() {
            Self::decode(err.to_string())
        } else {
            Self::new(ErrorKind::Network, "NETWORK_ERROR", err.to_string())
        }
    }

    /// Read a non-success response and normalize its body.
    pub async fn from_response(resp: reqwest::Response) -> Self {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Self::from_status_body(status, &body)
    }

    /// Normalize a status code plus raw body.
    ///
    /// Recognized bodies: `{code, message, fields}`, `{detail: "..."}`,
    /// `{detail: [{loc, msg}]}`, `{error, error_description}`, `{message}`.
    pub fn from_status_body(status: StatusCode, body: &str) -> Self {
        let kind = kind_for_status(status);
        let mut err = Self {
            kind,
            status: Some(status.as_u16()),
            code: default_code(status),
            message: status
                .canonical_reason()
                .unwrap_or("Unexpected response")
                .to_string(),
            fields: None,
        };

        let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(body) else {
            return err;
        };

        match obj.get("code") {
            Some(Value::String(code)) if !code.is_empty() => err.code.clone_from(code),
            Some(Value::Number(n)) => err.code = n.to_string(),
            _ => {}
        }
        if let Some(Value::String(code)) = obj.get("error") {
            err.code.clone_from(code);
        }

        let message = obj
            .get("message")
            .or_else(|| obj.get("error_description"))
            .and_then(Value::as_str)
            .or_else(|| obj.get("detail").and_then(Value::as_str))
            .or_else(|| obj.get("error").and_then(Value::as_str));
        if let Some(message) = message {
            err.message = message.to_string();
        }

        let mut fields = FieldErrors::new();
        if let Some(Value::Object(map)) = obj.get("fields") {
            for (field, msgs) in map {
                fields.insert(field.clone(), messages_of(msgs));
            }
        }
        if let Some(Value::Array(items)) = obj.get("detail") {
            for item in items {
                let field = item
                    .get("loc")
                    .and_then(Value::as_array)
                    .and_then(|loc| loc.last())
                    .map_or_else(|| "body".to_string(), loc_to_string);
                if let Some(msg) = item.get("msg").and_then(Value::as_str) {
                    fields.entry(field).or_default().push(msg.to_string());
                }
            }
        }
        if !fields.is_empty() {
            err.fields = Some(fields);
        }
        err
    }
}

impl From<mileage_core::Error> for ApiError {
    fn from(err: mileage_core::Error) -> Self {
        match err {
            mileage_core::Error::Validation(fields) => Self {
                fields: Some(fields),
                ..Self::new(
                    ErrorKind::Validation,
                    "VALIDATION_ERROR",
                    "Please correct the highlighted fields",
                )
            },
            mileage_core::Error::InvalidId(raw) => Self::new(
                ErrorKind::Validation,
                "INVALID_ID",
                format!("{raw:?} is not a valid id"),
            ),
            other => Self::config(other.to_string()),
        }
    }
}

const fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        400 | 422 => ErrorKind::Validation,
        408 | 504 => ErrorKind::Timeout,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Client,
    }
}

fn default_code(status: StatusCode) -> String {
    status.canonical_reason().map_or_else(
        || format!("HTTP_{}", status.as_u16()),
        |reason| reason.to_ascii_uppercase().replace([' ', '-'], "_"),
    )
}

fn messages_of(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        other => vec![other.to_string()],
    }
}

fn loc_to_string(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_string)
}

/// Field errors keyed by field, for display.
pub fn describe_fields(fields: &BTreeMap<String, Vec<String>>) -> Vec<String> {
    fields
        .iter()
        .map(|(field, msgs)| format!("{field}: {}", msgs.join("; ")))
        .collect()
}
