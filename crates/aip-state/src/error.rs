//! Error types for aip-state

use thiserror::Error;

/// Errors raised by dataset cache backends.
///
/// Variants carry rendered messages rather than source errors so the value
/// can be cloned into a stored sync failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend could not be opened or connected
    #[error("Cache connection failed: {0}")]
    Connection(String),

    /// Filesystem error
    #[error("Cache I/O failed: {0}")]
    Io(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Deserialization of a stored entry failed
    #[error("Corrupt cache entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// Backend query error
    #[error("Cache backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
