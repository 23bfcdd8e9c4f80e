//! AIP-Core: Sync Engine and Dataset Parser for AIP-SYNC
//!
//! Ties the publisher feed and the cache stores together. `SyncEngine::init`
//! probes the publisher, serves the cached dataset when the validity window
//! is already known, and otherwise fetches, extracts and parses the edition
//! before storing it.
//!
//! ## Layer 2 - Orchestration
//!
//! Focus: Never re-download an edition whose window is cached; never cache a
//! partial parse.

pub mod engine;
pub mod error;
pub mod files;
pub mod obs;
pub mod parser;
pub mod pipeline;
pub mod telemetry;

pub use engine::{ReadySnapshot, SyncEngine, SyncState, SyncStatus};
pub use error::{ParseError, Result, SyncError};
pub use parser::{
    parse_directory, ParseReport, ParseWarning, ParsedSources, SourceKind,
};
pub use pipeline::{DatasetFetcher, FetchExtractPipeline, FetchOutcome};

pub use obs::{
    emit_cache_entry_corrupt, emit_cache_lookup, emit_dataset_stored, emit_fetch_completed,
    emit_probe_completed, emit_sync_failed, emit_sync_finished, emit_sync_started, SyncSpan,
};
pub use telemetry::init_tracing;

pub use aip_state::{CacheKey, CycleId, ParsedDataset, ValidityWindow};

/// AIP-SYNC version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
