//! Error types for the remote sync client.

use centavo_core::errors::SyncError;
use thiserror::Error;

/// Result type alias for remote API operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Errors raised while talking to the remote store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP client error (DNS, connect, timeout, body transfer)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error response from the API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (bad token format, malformed configuration)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Http(e) => SyncError::TransportFailure(e.to_string()),
            RemoteError::Api { status, message } => SyncError::RemoteRejected { status, message },
            RemoteError::InvalidRequest(message) => SyncError::TransportFailure(message),
        }
    }
}
