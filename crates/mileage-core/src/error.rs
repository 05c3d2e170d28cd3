//! Error types for Mileage core library.

use std::collections::BTreeMap;

use thiserror::Error;

/// Result type alias using Mileage Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Field name to the list of messages reported for it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Core error types for Mileage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// One or more required environment variables are absent
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    /// Malformed identifier
    #[error("Invalid id {0:?}: expected a non-negative decimal integer")]
    InvalidId(String),

    /// Client-side form validation failed
    #[error("Validation failed: {}", format_fields(.0))]
    Validation(FieldErrors),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_fields(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, msgs)| format!("{field}: {}", msgs.join("; ")))
        .collect::<Vec<_>>()
        .join(", ")
}
