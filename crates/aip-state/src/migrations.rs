//! SurrealDB schema initialization for the dataset cache
//!
//! Safe to call on every connection (idempotent).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::storage_traits::StorageResult;

/// Initialize all AIP-SYNC tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Initializing AIP-SYNC SurrealDB schema");
    init_datasets_table(db).await?;
    Ok(())
}

/// Initialize `datasets` table
///
/// Schema:
/// ```text
/// TABLE datasets {
///   key:        STRING (unique, "<validFrom>/<validUntil|..>")
///   cycle:      STRING (indexed)
///   payload:    STRING (ParsedDataset JSON)
///   stored_at:  DATETIME
/// }
/// ```
///
/// The payload is stored as a JSON string so the persisted entry is
/// byte-for-byte the dataset shape returned to callers.
async fn init_datasets_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing datasets table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS datasets AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_dataset_key ON TABLE datasets COLUMNS key UNIQUE;

        DEFINE INDEX IF NOT EXISTS idx_dataset_cycle ON TABLE datasets COLUMNS cycle;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}
