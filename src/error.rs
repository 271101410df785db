//! Huginn error types

use std::time::Duration;

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Model/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("model call timed out")]
    Timeout,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("empty response from model")]
    EmptyResponse,

    /// Free-form failure raised by a model client that has no better mapping.
    #[error("model error: {0}")]
    Model(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("operation not implemented: {0}")]
    NotImplemented(&'static str),
}

impl HuginnError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Everything is treated as transient except errors that no amount of
    /// waiting will fix: bad credentials, bad input, bad configuration, and
    /// missing capabilities.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            HuginnError::AuthenticationFailed
                | HuginnError::InvalidInput(_)
                | HuginnError::Configuration(_)
                | HuginnError::NotImplemented(_)
        )
    }

    /// Provider-supplied backoff hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HuginnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HuginnError::Timeout
        } else {
            HuginnError::Http(err.to_string())
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
