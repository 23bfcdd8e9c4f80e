//! Storage trait definitions for AIP-SYNC
//!
//! `DatasetCache` is the durable mapping from a [`CacheKey`] to a previously
//! computed [`ParsedDataset`]. It is async and backend-agnostic; the sync
//! engine treats a hit as authoritative and skips fetching and parsing.
//!
//! Implementations:
//! - `FsDatasetCache`: one JSON file per key under a cache root
//! - `SurrealDatasetCache`: SurrealDB table (`surrealkv://` or `mem://`)
//! - `fakes::MemoryDatasetCache`: in-memory, for tests

use async_trait::async_trait;

use crate::error::StorageError;
use crate::schema::{CacheKey, ParsedDataset};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Durable dataset cache.
///
/// Guarantees:
/// - `set(k, v)` followed by `get(k)` in the same process returns `Some(v)`.
/// - Entries survive a process restart (except for in-memory backends).
/// - `set` on an existing key replaces the entry; other keys are untouched,
///   so datasets for superseded windows stay retrievable.
#[async_trait]
pub trait DatasetCache: Send + Sync {
    /// Look up a dataset. `Ok(None)` when absent.
    async fn get(&self, key: &CacheKey) -> StorageResult<Option<ParsedDataset>>;

    /// Store a dataset under `key`, replacing any previous entry.
    async fn set(&self, key: &CacheKey, dataset: &ParsedDataset) -> StorageResult<()>;

    /// Remove an entry. No-op if absent.
    async fn remove(&self, key: &CacheKey) -> StorageResult<()>;

    /// All stored keys, sorted.
    async fn keys(&self) -> StorageResult<Vec<CacheKey>>;
}
