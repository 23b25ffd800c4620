//! Error types for the backend clients.

use thiserror::Error;

/// Errors raised by chat backend calls.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Login was rejected, or the response carried no usable credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The backend rejected the session token (HTTP 401).
    #[error("session expired")]
    AuthExpired,

    /// Retries exhausted. `source` is the last underlying failure.
    #[error("backend unavailable after {attempts} attempts: {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: Box<BackendError>,
    },

    /// Connection, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status other than 401.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The response body could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The client is missing configuration for this call.
    #[error("not configured: {0}")]
    NotConfigured(&'static str),
}

impl BackendError {
    /// Whether the retry policy may try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status(_))
    }

    /// Whether this error means the session token is no longer valid.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::AuthExpired => true,
            Self::Unavailable { source, .. } => source.is_auth_expired(),
            _ => false,
        }
    }

    /// Short static label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::AuthExpired => "auth_expired",
            Self::Unavailable { .. } => "unavailable",
            Self::Transport(_) => "transport",
            Self::Status(_) => "status",
            Self::InvalidResponse(_) => "invalid_response",
            Self::NotConfigured(_) => "not_configured",
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Status(status.as_u16()),
            // Display of a reqwest error includes the URL but never headers.
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
