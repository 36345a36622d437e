//! Huginn error types

use std::time::Duration;

use crate::rest::Method;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-2xx REST response.
    ///
    /// Carries the vendor error code and message from the response body along
    /// with the request that caused it.
    #[error("API error ({status}) on {method} {path}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        method: Method,
        path: String,
        body: Option<serde_json::Value>,
    },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    // Streaming errors
    #[error("stream error: {0}")]
    Stream(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(String),

    // Synchronization errors
    /// A pushed event referenced a parent that could not be resolved to the
    /// expected kind (e.g. a message event for a docs channel).
    #[error("resolution error: {0}")]
    Resolution(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HuginnError {
    /// Whether this error is a rate-limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, HuginnError::RateLimited { .. })
    }

    /// Whether this error is likely to succeed on a later attempt.
    ///
    /// Connection failures, rate limits and 5xx responses are transient;
    /// everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            HuginnError::RateLimited { .. } | HuginnError::Http(_) => true,
            HuginnError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            HuginnError::Api { status, .. } => Some(*status),
            HuginnError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
