//! Error types for the embedded storage backend

use alcove_core::StoreError;
use thiserror::Error;

/// Embedded backend error type
#[derive(Error, Debug)]
pub enum EmbeddedError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(String),

    /// Schema/DDL error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for embedded backend operations
pub type EmbeddedResult<T> = Result<T, EmbeddedError>;

impl From<EmbeddedError> for StoreError {
    fn from(err: EmbeddedError) -> Self {
        match err {
            EmbeddedError::Connection(msg) => StoreError::Backend(msg),
            EmbeddedError::Query(msg) => StoreError::Backend(msg),
            EmbeddedError::Schema(msg) => StoreError::Backend(msg),
            EmbeddedError::Serialization(msg) => StoreError::Serialization(msg),
            EmbeddedError::Rusqlite(e) => StoreError::Backend(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for EmbeddedError {
    fn from(err: serde_json::Error) -> Self {
        EmbeddedError::Serialization(err.to_string())
    }
}
