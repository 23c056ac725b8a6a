//! Error types for the storage layer

use thiserror::Error;

/// Storage layer error type shared by both adapters
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Malformed schema definition or invalid call arguments
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation invoked before a successful `connect`
    #[error("Not connected: call connect() before using the store")]
    NotConnected,

    /// Backend connectivity/conflict failure on a CRUD or DDL call
    #[error("Backend error: {0}")]
    Backend(String),

    /// Language-model extraction failed after exhausting the retry schedule
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// The backend does not support the requested capability
    ///
    /// Distinguished from [`StoreError::Backend`] so traversal can fall
    /// back to client-side BFS only when the server-side primitive is
    /// actually unavailable, instead of on every failure mode.
    #[error("Unsupported capability: {0}")]
    Unsupported(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
