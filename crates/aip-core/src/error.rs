//! Error taxonomy for the sync engine.

use std::time::Duration;

use aip_feed::{FetchError, ProbeError};
use aip_state::StorageError;

/// Unrecoverable dataset parse failures.
///
/// Malformed individual records are not errors; they are skipped and
/// reported as warnings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{path}: unrecognised file structure: {reason}")]
    Structure { path: String, reason: String },

    #[error("{path}: not valid UTF-8 text")]
    Encoding { path: String },

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::Io(err.to_string())
    }
}

/// Errors surfaced by the public sync operations.
///
/// `Clone` so a failed attempt can be kept in the sync state and returned
/// again by later queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("sync engine not initialized: call init first")]
    NotInitialized,

    #[error("probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("cache error: {0}")]
    Cache(#[from] StorageError),

    #[error("a sync is already in progress")]
    InProgress,

    #[error("sync was cancelled")]
    Cancelled,

    #[error("sync timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid file pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("cannot list extracted files: {0}")]
    Listing(String),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
