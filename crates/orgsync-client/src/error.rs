//! Client error types.

use thiserror::Error;

/// Errors raised while talking to the catalog or the source.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("authentication failed: {0}")]
    AuthError(String),

    #[error("API error (HTTP {status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid business key: {0}")]
    InvalidPath(String),

    #[error("max retries exceeded after {attempts} attempt(s): {message}")]
    MaxRetriesExceeded { attempts: u32, message: String },
}

impl ClientError {
    /// Network-level failures and rate limiting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// HTTP 5xx responses.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status >= 500)
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
