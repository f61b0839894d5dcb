//! Error types for the session crate.

use thiserror::Error;

/// Result type for session store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a session store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The store could not be reached or failed internally.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// A session was written for a caller whose stored version is newer.
    #[error("caller {caller_id} is at version {current}, session has version {session}")]
    OutdatedCaller {
        /// Caller id.
        caller_id: String,
        /// Version recorded in the session.
        session: u64,
        /// Caller's current version.
        current: u64,
    },

    /// A stored session could not be (de)serialized.
    #[error("session serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Failure to produce an augmented session.
#[derive(Debug, Error)]
#[error("augmented session persist failed: {source}")]
pub struct AugmentationError {
    /// Underlying store error.
    #[from]
    pub source: StoreError,
}
