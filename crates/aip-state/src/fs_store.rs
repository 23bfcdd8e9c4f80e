//! Filesystem-backed dataset cache.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::schema::{CacheKey, ParsedDataset};
use crate::storage_traits::{DatasetCache, StorageResult};

/// On-disk envelope; the key is kept alongside the dataset so `keys()` does
/// not have to invert the file-name hash.
#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    key: CacheKey,
    dataset: ParsedDataset,
}

/// Dataset cache storing one JSON file per key, with git-style 2-char sharding.
///
/// Layout: `<root>/datasets/<first 2 hex chars>/<remaining hex chars>.json`
/// where the hex string is the SHA-256 of the cache key.
#[derive(Debug, Clone)]
pub struct FsDatasetCache {
    datasets_dir: PathBuf,
}

impl FsDatasetCache {
    /// Create a cache rooted at `root`. Creates `root/datasets/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let datasets_dir = root.as_ref().join("datasets");
        fs::create_dir_all(&datasets_dir)?;
        Ok(Self { datasets_dir })
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let hex = hex::encode(Sha256::digest(key.as_str().as_bytes()));
        self.datasets_dir
            .join(&hex[..2])
            .join(format!("{}.json", &hex[2..]))
    }

    fn read_entry(path: &Path) -> StorageResult<Option<Entry>> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StorageError::CorruptEntry {
                key: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn write_entry(path: &Path, entry: &Entry) -> StorageResult<()> {
        let shard_dir = path
            .parent()
            .ok_or_else(|| StorageError::Io(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(shard_dir)?;

        // Atomic write: temp file in the same directory, then rename.
        let bytes = serde_json::to_vec_pretty(entry)?;
        let mut tmp = NamedTempFile::new_in(shard_dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(path).map_err(|e| StorageError::Io(e.error.to_string()))?;
        Ok(())
    }

    fn collect_keys(&self) -> StorageResult<Vec<CacheKey>> {
        let mut keys = Vec::new();
        for shard in fs::read_dir(&self.datasets_dir)? {
            let shard = shard?.path();
            if !shard.is_dir() {
                continue;
            }
            for file in fs::read_dir(&shard)? {
                let file = file?.path();
                if !file.extension().map(|e| e == "json").unwrap_or(false) {
                    continue;
                }
                match Self::read_entry(&file) {
                    Ok(Some(entry)) => keys.push(entry.key),
                    Ok(None) => {}
                    Err(StorageError::CorruptEntry { reason, .. }) => {
                        warn!(path = %file.display(), %reason, "skipping corrupt cache entry");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(keys)
    }
}

async fn blocking<T, F>(f: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Backend(format!("blocking task failed: {e}")))?
}

#[async_trait]
impl DatasetCache for FsDatasetCache {
    async fn get(&self, key: &CacheKey) -> StorageResult<Option<ParsedDataset>> {
        let path = self.entry_path(key);
        let expected = key.clone();
        blocking(move || {
            let Some(entry) = Self::read_entry(&path)? else {
                return Ok(None);
            };
            if entry.key != expected {
                return Err(StorageError::CorruptEntry {
                    key: expected.to_string(),
                    reason: format!("entry holds key {}", entry.key),
                });
            }
            Ok(Some(entry.dataset))
        })
        .await
    }

    async fn set(&self, key: &CacheKey, dataset: &ParsedDataset) -> StorageResult<()> {
        let path = self.entry_path(key);
        debug!(key = %key, path = %path.display(), "writing cache entry");
        let entry = Entry {
            key: key.clone(),
            dataset: dataset.clone(),
        };
        blocking(move || Self::write_entry(&path, &entry)).await
    }

    async fn remove(&self, key: &CacheKey) -> StorageResult<()> {
        let path = self.entry_path(key);
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn keys(&self) -> StorageResult<Vec<CacheKey>> {
        let this = self.clone();
        blocking(move || this.collect_keys()).await
    }
}
