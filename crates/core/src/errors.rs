//! Error types shared across the centavo crates.

use thiserror::Error;

/// Result type alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Local database failures, reported by the storage layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Database query failed: {0}")]
    Query(String),

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("{0}")]
    Internal(String),
}

/// Top-level error for queue/sync/hydration operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid mutation payload: {0}")]
    InvalidPayload(String),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Retry policy classification for sync failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRetryClass {
    /// Safe to retry on the normal flush schedule.
    Retryable,
    /// No retry will ever succeed; the user must clear local data.
    RequiresReset,
}

/// Failure taxonomy for one remote sync attempt.
///
/// `MalformedIdentifier` only arises from corrupted local state and is never
/// sent over the wire; the other variants describe the remote attempt itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("remote store rejected the write ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl SyncError {
    /// Stable machine-readable code, persisted into mutation bookkeeping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedIdentifier(_) => "malformed_identifier",
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::TransportFailure(_) => "transport_failure",
        }
    }

    /// Classify this failure for retry policy.
    ///
    /// Remote rejections stay retryable: this engine cannot tell a permanent
    /// validation failure from a transient conflict without owning the
    /// server's semantics.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::MalformedIdentifier(_) => SyncRetryClass::RequiresReset,
            Self::RemoteRejected { .. } | Self::TransportFailure(_) => SyncRetryClass::Retryable,
        }
    }

    /// Actionable instruction for failures the engine cannot recover from.
    pub fn user_guidance(&self) -> Option<&'static str> {
        match self.retry_class() {
            SyncRetryClass::RequiresReset => {
                Some("Local data is corrupted. Clear local app data to recover.")
            }
            SyncRetryClass::Retryable => None,
        }
    }
}
