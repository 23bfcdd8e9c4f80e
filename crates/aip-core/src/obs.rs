//! Structured observability hooks for the sync lifecycle.
//!
//! This module provides:
//! - An attempt-scoped tracing span via [`SyncSpan`]
//! - Emission functions for the lifecycle events of one `init` attempt
//!
//! Events are emitted at `info!` level (configurable via `AIPSYNC_LOG`).
//! For JSON output, pass `--json` to the CLI.

use tracing::{info, warn};

/// Span tagged with a fresh attempt id, covering one `init` call.
///
/// Attach it to the attempt's future with `Instrument::instrument` so it
/// follows the future across await points.
///
/// # Example
///
/// ```ignore
/// let attempt = SyncSpan::new();
/// do_sync().instrument(attempt.span().clone()).await;
/// ```
#[derive(Debug, Clone)]
pub struct SyncSpan {
    attempt_id: String,
    span: tracing::Span,
}

impl SyncSpan {
    pub fn new() -> Self {
        let attempt_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("aipsync.sync", attempt_id = %attempt_id);
        Self { attempt_id, span }
    }

    pub fn attempt_id(&self) -> &str {
        &self.attempt_id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl Default for SyncSpan {
    fn default() -> Self {
        Self::new()
    }
}

/// Emit event: sync attempt started.
pub fn emit_sync_started(attempt_id: &str, working_dir: &str) {
    info!(event = "sync.started", attempt_id = %attempt_id, working_dir = %working_dir);
}

/// Emit event: the publisher reported the current edition.
pub fn emit_probe_completed(cycle: &str, cache_key: &str) {
    info!(event = "probe.completed", cycle = %cycle, cache_key = %cache_key);
}

/// Emit event: cache lookup result.
pub fn emit_cache_lookup(cache_key: &str, hit: bool) {
    info!(event = "cache.lookup", cache_key = %cache_key, hit = hit);
}

/// Emit event: a cache entry could not be decoded and is treated as a miss.
pub fn emit_cache_entry_corrupt(cache_key: &str, error: &dyn std::fmt::Display) {
    warn!(event = "cache.entry_corrupt", cache_key = %cache_key, error = %error);
}

/// Emit event: raw files are available for parsing.
pub fn emit_fetch_completed(cycle: &str, dir: &str, reused: bool) {
    info!(event = "fetch.completed", cycle = %cycle, dir = %dir, reused = reused);
}

/// Emit event: parsed dataset written to the cache.
pub fn emit_dataset_stored(cache_key: &str, aerodromes: usize, prohibited_areas: usize, tma: usize) {
    info!(
        event = "cache.stored",
        cache_key = %cache_key,
        aerodromes = aerodromes,
        prohibited_areas = prohibited_areas,
        tma = tma,
    );
}

/// Emit event: sync attempt finished successfully.
pub fn emit_sync_finished(attempt_id: &str, cycle: &str, duration_ms: u64, cache_hit: bool) {
    info!(
        event = "sync.finished",
        attempt_id = %attempt_id,
        cycle = %cycle,
        duration_ms = duration_ms,
        cache_hit = cache_hit,
    );
}

/// Emit event: sync attempt failed (warning level).
pub fn emit_sync_failed(attempt_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "sync.failed", attempt_id = %attempt_id, error = %error);
}
