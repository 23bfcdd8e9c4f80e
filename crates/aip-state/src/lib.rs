//! AIP-State: Dataset Model and Cache Stores for AIP-SYNC
//!
//! This crate provides the persistence layer for the AIP synchronization
//! engine: the canonical dataset model and the durable cache that maps a
//! validity window to a previously parsed dataset.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Injective cache keys and durable, read-your-writes storage.
//!
//! ## Key Components
//!
//! - `ValidityWindow` / `CacheKey`: window of authority and its key encoding
//! - `ParsedDataset`: aerodromes, prohibited areas and TMA of one edition
//! - `DatasetCache`: the store contract, with filesystem, SurrealDB and
//!   in-memory implementations

mod error;
pub mod fakes;
mod fs_store;
mod migrations;
mod schema;
pub mod storage_traits;
mod surreal_store;

pub use error::StorageError;
pub use fs_store::FsDatasetCache;
pub use schema::{
    format_instant, Aerodrome, AirspaceProperties, CacheKey, CycleId, Feature, FeatureCollection,
    FeatureCollectionTag, FeatureTag, Geometry, ParsedDataset, Position, Runway, ValidityWindow,
};
pub use storage_traits::{DatasetCache, StorageResult};
pub use surreal_store::SurrealDatasetCache;
