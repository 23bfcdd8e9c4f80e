//! SurrealDB-backed DatasetCache implementation
//!
//! Records live in the `datasets` table with the SHA-256 of the cache key as
//! record id; the dataset itself is kept as a JSON string payload.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::migrations;
use crate::schema::{CacheKey, ParsedDataset};
use crate::storage_traits::{DatasetCache, StorageResult};

const TABLE: &str = "datasets";
const NAMESPACE: &str = "aipsync";
const DATABASE: &str = "main";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbDataset {
    key: String,
    cycle: String,
    payload: String,
    stored_at: SurrealDatetime,
}

#[derive(Debug, Deserialize)]
struct DbKey {
    key: String,
}

/// SurrealDB-backed implementation of [`DatasetCache`].
#[derive(Clone)]
pub struct SurrealDatasetCache {
    db: Surreal<Any>,
}

impl SurrealDatasetCache {
    /// Connect to any SurrealDB endpoint (`mem://`, `surrealkv://path`, `ws://...`).
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealDatasetCache connected");
        Ok(Self { db })
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect("mem://").await
    }

    /// Open (or create) a durable store in `dir` using the SurrealKV engine.
    pub async fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            StorageError::Connection(format!(
                "Failed to create database directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Self::connect(&format!("surrealkv://{}", dir.display())).await
    }

    /// Connect using `SURREALDB_URL` if set, otherwise a durable store in `default_dir`.
    pub async fn from_env(default_dir: impl AsRef<Path>) -> StorageResult<Self> {
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            return Self::connect(&url).await;
        }
        Self::open(default_dir).await
    }

    fn record_id(key: &CacheKey) -> String {
        hex::encode(Sha256::digest(key.as_str().as_bytes()))
    }
}

#[async_trait]
impl DatasetCache for SurrealDatasetCache {
    async fn get(&self, key: &CacheKey) -> StorageResult<Option<ParsedDataset>> {
        let row: Option<DbDataset> = self.db.select((TABLE, Self::record_id(key))).await?;

        let Some(row) = row else {
            return Ok(None);
        };
        serde_json::from_str(&row.payload)
            .map(Some)
            .map_err(|e| StorageError::CorruptEntry {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn set(&self, key: &CacheKey, dataset: &ParsedDataset) -> StorageResult<()> {
        let row = DbDataset {
            key: key.as_str().to_string(),
            cycle: dataset.cycle.as_str().to_string(),
            payload: serde_json::to_string(dataset)?,
            stored_at: SurrealDatetime::from(Utc::now()),
        };

        debug!(key = %key, "upserting dataset");

        let _stored: Option<DbDataset> = self
            .db
            .upsert((TABLE, Self::record_id(key)))
            .content(row)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> StorageResult<()> {
        let _removed: Option<DbDataset> = self.db.delete((TABLE, Self::record_id(key))).await?;
        Ok(())
    }

    async fn keys(&self) -> StorageResult<Vec<CacheKey>> {
        let mut res = self
            .db
            .query("SELECT key FROM datasets ORDER BY key ASC")
            .await?;
        let rows: Vec<DbKey> = res.take(0)?;
        Ok(rows.into_iter().map(|r| CacheKey::from(r.key)).collect())
    }
}
