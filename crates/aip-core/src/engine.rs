//! Sync engine
//!
//! Owns the lifecycle of one synchronised AIP edition:
//!
//! ```text
//! Uninitialized --init--> Syncing --ok--> Ready
//!                            |
//!                            +--err-----> Failed
//! ```
//!
//! `init` probes the publisher, derives the cache key from the validity
//! window and either serves the cached dataset or runs fetch, extract and
//! parse before storing the result. Only one attempt may be in flight; a
//! concurrent `init` is rejected with [`SyncError::InProgress`]. Queries wait
//! for an in-flight attempt to settle and never touch the network.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aip_feed::{FeedConfig, HttpPublisherProbe, PublisherProbe};
use aip_state::{CacheKey, CycleId, DatasetCache, ParsedDataset, StorageError};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::Instrument;

use crate::error::{ParseError, Result, SyncError};
use crate::files::{glob_relative, ListError};
use crate::obs::{
    emit_cache_entry_corrupt, emit_cache_lookup, emit_dataset_stored, emit_fetch_completed,
    emit_probe_completed, emit_sync_failed, emit_sync_finished, emit_sync_started, SyncSpan,
};
use crate::parser::{parse_directory, ParseReport};
use crate::pipeline::{DatasetFetcher, FetchExtractPipeline};

/// A settled, successful sync.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadySnapshot {
    pub dataset: Arc<ParsedDataset>,
    pub cache_key: CacheKey,
    /// Directory parsed in this run; `None` when served from the cache
    pub source_dir: Option<PathBuf>,
    /// Skipped records; `None` when served from the cache
    pub report: Option<ParseReport>,
}

impl ReadySnapshot {
    pub fn cache_hit(&self) -> bool {
        self.source_dir.is_none()
    }
}

/// Engine lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Uninitialized,
    Syncing,
    Ready(Arc<ReadySnapshot>),
    Failed(SyncError),
}

/// View returned by [`SyncEngine::status`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub cycle: CycleId,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub cache_key: CacheKey,
    pub source_dir: Option<PathBuf>,
    pub cache_hit: bool,
    pub skipped_records: usize,
}

impl SyncStatus {
    fn from_snapshot(snapshot: &ReadySnapshot) -> Self {
        Self {
            cycle: snapshot.dataset.cycle.clone(),
            valid_from: snapshot.dataset.valid_from,
            valid_until: snapshot.dataset.valid_until,
            cache_key: snapshot.cache_key.clone(),
            source_dir: snapshot.source_dir.clone(),
            cache_hit: snapshot.cache_hit(),
            skipped_records: snapshot
                .report
                .as_ref()
                .map(|r| r.warnings.len())
                .unwrap_or(0),
        }
    }

    /// Extracted raw files matching `pattern`, relative to the cycle
    /// directory and sorted.
    ///
    /// Empty when nothing matches or when the dataset came from the cache.
    /// Reads the filesystem.
    pub fn files(&self, pattern: &str) -> Result<Vec<String>> {
        let invalid = |e: glob::PatternError| SyncError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.msg.to_string(),
        };
        match &self.source_dir {
            Some(dir) => glob_relative(dir, pattern, true).map_err(|e| match e {
                ListError::Pattern(e) => invalid(e),
                ListError::Walk(e) => SyncError::Listing(e.to_string()),
            }),
            None => {
                glob::Pattern::new(pattern).map_err(invalid)?;
                Ok(Vec::new())
            }
        }
    }
}

/// Puts the state back if an `init` future is dropped before it settles.
struct SyncGuard<'a> {
    state: &'a watch::Sender<SyncState>,
    on_cancel: Option<SyncState>,
}

impl SyncGuard<'_> {
    fn settle(mut self, next: SyncState) {
        self.on_cancel = None;
        self.state.send_replace(next);
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        if let Some(restore) = self.on_cancel.take() {
            tracing::warn!(event = "sync.cancelled");
            self.state.send_replace(restore);
        }
    }
}

/// Single-owner synchronisation engine.
pub struct SyncEngine {
    probe: Arc<dyn PublisherProbe>,
    fetcher: Arc<dyn DatasetFetcher>,
    cache: Arc<dyn DatasetCache>,
    timeout: Option<Duration>,
    state: watch::Sender<SyncState>,
}

impl SyncEngine {
    pub fn new(
        probe: Arc<dyn PublisherProbe>,
        fetcher: Arc<dyn DatasetFetcher>,
        cache: Arc<dyn DatasetCache>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Uninitialized);
        Self {
            probe,
            fetcher,
            cache,
            timeout: None,
            state,
        }
    }

    /// Engine talking to the configured publisher over HTTP.
    pub fn from_config(config: &FeedConfig, cache: Arc<dyn DatasetCache>) -> Result<Self> {
        Ok(Self::new(
            Arc::new(HttpPublisherProbe::new(config)?),
            Arc::new(FetchExtractPipeline::from_config(config)?),
            cache,
        ))
    }

    /// Bound each `init` attempt; elapsing fails it with [`SyncError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Current state without waiting.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Receiver observing every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Synchronise the current edition, using `working_dir` for raw files.
    pub async fn init(&self, working_dir: impl AsRef<Path>) -> Result<Arc<ParsedDataset>> {
        let working_dir = working_dir.as_ref();

        let mut previous = None;
        let claimed = self.state.send_if_modified(|state| {
            if matches!(state, SyncState::Syncing) {
                return false;
            }
            previous = Some(std::mem::replace(state, SyncState::Syncing));
            true
        });
        if !claimed {
            return Err(SyncError::InProgress);
        }
        let on_cancel = match previous {
            Some(SyncState::Uninitialized) | None => SyncState::Uninitialized,
            Some(_) => SyncState::Failed(SyncError::Cancelled),
        };
        let guard = SyncGuard {
            state: &self.state,
            on_cancel: Some(on_cancel),
        };

        let attempt = SyncSpan::new();
        let started = Instant::now();
        let work = self.attempt(working_dir, attempt.attempt_id());
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .instrument(attempt.span().clone())
                .await
                .unwrap_or(Err(SyncError::Timeout(limit))),
            None => work.instrument(attempt.span().clone()).await,
        };

        let _entered = attempt.span().enter();
        match result {
            Ok(snapshot) => {
                let dataset = snapshot.dataset.clone();
                emit_sync_finished(
                    attempt.attempt_id(),
                    dataset.cycle.as_str(),
                    started.elapsed().as_millis() as u64,
                    snapshot.cache_hit(),
                );
                guard.settle(SyncState::Ready(Arc::new(snapshot)));
                Ok(dataset)
            }
            Err(err) => {
                emit_sync_failed(attempt.attempt_id(), &err);
                guard.settle(SyncState::Failed(err.clone()));
                Err(err)
            }
        }
    }

    async fn attempt(&self, working_dir: &Path, attempt_id: &str) -> Result<ReadySnapshot> {
        emit_sync_started(attempt_id, &working_dir.display().to_string());

        let probe = self.probe.probe().await?;
        let cache_key = probe.window.cache_key();
        emit_probe_completed(probe.cycle.as_str(), cache_key.as_str());

        match self.cache.get(&cache_key).await {
            Ok(Some(dataset)) => {
                emit_cache_lookup(cache_key.as_str(), true);
                return Ok(ReadySnapshot {
                    dataset: Arc::new(dataset),
                    cache_key,
                    source_dir: None,
                    report: None,
                });
            }
            Ok(None) => emit_cache_lookup(cache_key.as_str(), false),
            Err(err @ StorageError::CorruptEntry { .. }) => {
                emit_cache_entry_corrupt(cache_key.as_str(), &err)
            }
            Err(err) => return Err(err.into()),
        }

        let fetched = self
            .fetcher
            .fetch(&probe.locator, working_dir, &probe.cycle)
            .await?;
        emit_fetch_completed(
            probe.cycle.as_str(),
            &fetched.dir.display().to_string(),
            fetched.reused,
        );

        let dir = fetched.dir.clone();
        let mut parsed = tokio::task::spawn_blocking(move || parse_directory(&dir))
            .await
            .map_err(|e| ParseError::Io(format!("parser task failed: {e}")))??;
        let report = std::mem::take(&mut parsed.report);
        let dataset = parsed.into_dataset(probe.cycle, probe.window);

        self.cache.set(&cache_key, &dataset).await?;
        emit_dataset_stored(
            cache_key.as_str(),
            dataset.aerodromes.len(),
            dataset.prohibited_areas.len(),
            dataset.tma.len(),
        );

        Ok(ReadySnapshot {
            dataset: Arc::new(dataset),
            cache_key,
            source_dir: Some(fetched.dir),
            report: Some(report),
        })
    }

    async fn settled(&self) -> Result<Arc<ReadySnapshot>> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|s| !matches!(s, SyncState::Syncing))
            .await
            .map(|s| s.clone())
            .map_err(|_| SyncError::NotInitialized)?;
        match state {
            SyncState::Uninitialized => Err(SyncError::NotInitialized),
            SyncState::Ready(snapshot) => Ok(snapshot),
            SyncState::Failed(err) => Err(err),
            SyncState::Syncing => Err(SyncError::InProgress),
        }
    }

    /// Cycle, window and raw file listing of the synchronised edition.
    pub async fn status(&self) -> Result<SyncStatus> {
        let snapshot = self.settled().await?;
        Ok(SyncStatus::from_snapshot(&snapshot))
    }

    /// The synchronised dataset. Repeated calls return the same value.
    pub async fn current(&self) -> Result<Arc<ParsedDataset>> {
        Ok(self.settled().await?.dataset.clone())
    }
}
