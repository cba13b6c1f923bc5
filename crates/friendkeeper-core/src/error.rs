//! Core error types for friendkeeper-core.
//!
//! Mirrors the error taxonomy exposed over the wire: insufficient balance is
//! its own variant because it drives a distinct "go buy tokens" path in the
//! consumer, and transient conditions are marked retryable so a poll loop can
//! tell them apart from hard failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for friendkeeper-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Generation was requested with both credit counters at zero.
    #[error("no generations remaining; purchase more tokens to continue")]
    InsufficientBalance,

    /// A relationship or interaction the caller referenced does not exist
    /// (or belongs to a different device).
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Malformed create/update input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Temporary condition; the caller should retry or keep polling.
    #[error("transient error: {0}")]
    Transient(String),

    /// Payment provider rejected or misconfigured.
    #[error("payment error: {0}")]
    Payment(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A required field was missing or blank
    #[error("'{field}' must not be empty")]
    Empty { field: &'static str },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },
}

impl CoreError {
    /// HTTP status the wire contract assigns to this error.
    pub fn status_code(&self) -> u16 {
        match self {
            CoreError::InsufficientBalance => 402,
            CoreError::NotFound { .. } => 404,
            CoreError::Validation(_) => 400,
            CoreError::Transient(_) => 503,
            _ => 500,
        }
    }

    /// Whether the caller should retry/poll instead of surfacing the error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}

/// Wire shape of the `detail` field in error bodies.
///
/// The contract allows either a bare string or a structured object with
/// `error`/`message`/`code`. Both shapes collapse into one readable message
/// here, at the boundary, so no consumer ever sees a stringified object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Structured {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        code: Option<String>,
    },
}

impl ErrorDetail {
    /// Normalize either shape into a human-readable message.
    pub fn message(&self, status: u16) -> String {
        match self {
            ErrorDetail::Text(s) => s.clone(),
            ErrorDetail::Structured { error, message, .. } => error
                .clone()
                .or_else(|| message.clone())
                .unwrap_or_else(|| format!("Request failed with status {status}")),
        }
    }

    /// Machine-readable code, when the structured shape carried one.
    pub fn code(&self) -> Option<&str> {
        match self {
            ErrorDetail::Text(_) => None,
            ErrorDetail::Structured { code, .. } => code.as_deref(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
