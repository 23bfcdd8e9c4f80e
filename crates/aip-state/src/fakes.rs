//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryDatasetCache`, which satisfies the `DatasetCache` contract
//! without any external dependencies and counts its calls so tests can assert
//! cache-hit behaviour.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::schema::{CacheKey, ParsedDataset};
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryDatasetCache
// ---------------------------------------------------------------------------

/// In-memory dataset cache backed by a `BTreeMap<key, dataset>`.
#[derive(Debug, Default)]
pub struct MemoryDatasetCache {
    entries: Mutex<BTreeMap<String, ParsedDataset>>,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl MemoryDatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls served so far.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `set` calls served so far.
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DatasetCache for MemoryDatasetCache {
    async fn get(&self, key: &CacheKey) -> StorageResult<Option<ParsedDataset>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key.as_str()).cloned())
    }

    async fn set(&self, key: &CacheKey, dataset: &ParsedDataset) -> StorageResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.as_str().to_string(), dataset.clone());
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> StorageResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key.as_str());
        Ok(())
    }

    async fn keys(&self) -> StorageResult<Vec<CacheKey>> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.keys().cloned().map(CacheKey::from).collect())
    }
}
