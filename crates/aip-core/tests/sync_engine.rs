//! Sync engine behaviour against in-memory fakes.
//!
//! The probe, fetcher and downloader fakes count their calls so the tests can
//! assert when the network would (not) have been touched.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aip_core::{
    DatasetFetcher, FetchExtractPipeline, FetchOutcome, ParseError, SyncEngine, SyncError,
    SyncState,
};
use aip_feed::{
    ArchiveExtractor, DownloadLocator, Downloader, FetchError, ProbeError, ProbeResult,
    PublisherProbe, Url,
};
use aip_state::fakes::MemoryDatasetCache;
use aip_state::{
    CacheKey, CycleId, DatasetCache, ParsedDataset, StorageError, StorageResult, ValidityWindow,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Notify;

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn edition(cycle: &str, window: ValidityWindow) -> ProbeResult {
    ProbeResult {
        cycle: CycleId::new(cycle),
        window,
        locator: DownloadLocator {
            urls: vec![
                Url::parse("https://ais.fi/files/aip/2010-06-23/part1.iso").unwrap(),
                Url::parse("https://ais.fi/files/aip/2010-06-23/part2.iso").unwrap(),
            ],
        },
    }
}

fn june_edition() -> ProbeResult {
    edition("2010-06-23", ValidityWindow::open_ended(day(2010, 6, 23)))
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeProbe {
    next: Mutex<Result<ProbeResult, ProbeError>>,
    calls: AtomicUsize,
}

impl FakeProbe {
    fn new(result: Result<ProbeResult, ProbeError>) -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new(result),
            calls: AtomicUsize::new(0),
        })
    }

    fn publish(&self, result: Result<ProbeResult, ProbeError>) {
        *self.next.lock().unwrap() = result;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublisherProbe for FakeProbe {
    async fn probe(&self) -> Result<ProbeResult, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next.lock().unwrap().clone()
    }
}

/// Writes a fixed set of raw files into `<work>/<cycle>`.
#[derive(Default)]
struct FakeFetcher {
    files: Vec<(&'static str, &'static str)>,
    error: Option<FetchError>,
    entered: Option<Arc<Notify>>,
    release: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    fn with_files(files: Vec<(&'static str, &'static str)>) -> Arc<Self> {
        Arc::new(Self {
            files,
            ..Default::default()
        })
    }

    fn gated(entered: Arc<Notify>, release: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            entered: Some(entered),
            release: Some(release),
            ..Default::default()
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetFetcher for FakeFetcher {
    async fn fetch(
        &self,
        _locator: &DownloadLocator,
        working_dir: &Path,
        cycle: &CycleId,
    ) -> Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(entered) = &self.entered {
            entered.notify_one();
        }
        if let Some(release) = &self.release {
            release.notified().await;
        }
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let dir = working_dir.join(cycle.as_str());
        std::fs::create_dir_all(&dir)?;
        for (name, text) in &self.files {
            std::fs::write(dir.join(name), text)?;
        }
        Ok(FetchOutcome { dir, reused: false })
    }
}

#[derive(Default)]
struct CountingDownloader {
    calls: AtomicUsize,
}

#[async_trait]
impl Downloader for CountingDownloader {
    async fn download(&self, url: &Url, _dest: &Path) -> Result<u64, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Http(format!("unexpected download of {url}")))
    }
}

struct NoExtractor;

#[async_trait]
impl ArchiveExtractor for NoExtractor {
    async fn extract(&self, archive: &Path, _dest: &Path) -> Result<(), FetchError> {
        Err(FetchError::ExtractorUnavailable(archive.display().to_string()))
    }
}

/// Cache whose reads always fail with a fixed error.
struct FailingReads {
    error: StorageError,
    inner: MemoryDatasetCache,
}

#[async_trait]
impl DatasetCache for FailingReads {
    async fn get(&self, _key: &CacheKey) -> StorageResult<Option<ParsedDataset>> {
        Err(self.error.clone())
    }

    async fn set(&self, key: &CacheKey, dataset: &ParsedDataset) -> StorageResult<()> {
        self.inner.set(key, dataset).await
    }

    async fn remove(&self, key: &CacheKey) -> StorageResult<()> {
        self.inner.remove(key).await
    }

    async fn keys(&self) -> StorageResult<Vec<CacheKey>> {
        self.inner.keys().await
    }
}

const ENR_5_1: &str = "\
ENR 5.1 PROHIBITED, RESTRICTED AND DANGER AREAS
EFP2 LOVIISA
602700N 0262400E - 602800N 0262600E - 602600N 0262700E
Upper limit: FL 95
Lower limit: GND
EFR99 BROKEN
602700N 0262400E
";

const EFHK: &str = "EFHK - HELSINKI-VANTAA\nARP 601902N 0245813E\nElevation 179 FT\n";

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queries_before_init_are_not_initialized() {
    let engine = SyncEngine::new(
        FakeProbe::new(Ok(june_edition())),
        FakeFetcher::with_files(vec![]),
        Arc::new(MemoryDatasetCache::new()),
    );

    assert_eq!(engine.state(), SyncState::Uninitialized);
    assert_eq!(engine.status().await.unwrap_err(), SyncError::NotInitialized);
    assert_eq!(engine.current().await.unwrap_err(), SyncError::NotInitialized);
}

#[tokio::test]
async fn june_2010_edition_end_to_end_with_pre_staged_directory() {
    let work = tempfile::tempdir().unwrap();
    std::fs::create_dir(work.path().join("2010-06-23")).unwrap();

    let probe = FakeProbe::new(Ok(june_edition()));
    let downloader = Arc::new(CountingDownloader::default());
    let pipeline = Arc::new(FetchExtractPipeline::new(
        downloader.clone(),
        Arc::new(NoExtractor),
    ));
    let cache = Arc::new(MemoryDatasetCache::new());
    let engine = SyncEngine::new(probe.clone(), pipeline, cache.clone());

    let dataset = engine.init(work.path()).await.unwrap();

    let expected = serde_json::json!({
        "cycle": "2010-06-23",
        "validFrom": "2010-06-23T00:00:00.000Z",
        "aerodromes": [],
        "prohibitedAreas": { "type": "FeatureCollection", "features": [] },
        "tma": { "type": "FeatureCollection", "features": [] },
    });
    assert_eq!(serde_json::to_value(&*dataset).unwrap(), expected);
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);

    let key = CacheKey::from("2010-06-23T00:00:00.000Z/..".to_string());
    assert_eq!(dataset.cache_key(), key);
    assert_eq!(cache.get(&key).await.unwrap().as_ref(), Some(&*dataset));

    let status = engine.status().await.unwrap();
    assert_eq!(status.cycle, CycleId::new("2010-06-23"));
    assert_eq!(status.valid_from, day(2010, 6, 23));
    assert_eq!(status.valid_until, None);
    assert!(!status.cache_hit);
    assert_eq!(status.files("*").unwrap(), Vec::<String>::new());

    // second init: cache hit, no further fetch
    let again = engine.init(work.path()).await.unwrap();
    assert_eq!(again, dataset);
    assert_eq!(probe.calls(), 2);
    assert_eq!(cache.set_count(), 1);
    assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
    let status = engine.status().await.unwrap();
    assert!(status.cache_hit);
    assert!(status.files("*").unwrap().is_empty());
}

#[tokio::test]
async fn first_init_parses_and_stores_then_current_is_stable() {
    let work = tempfile::tempdir().unwrap();
    let probe = FakeProbe::new(Ok(june_edition()));
    let fetcher = FakeFetcher::with_files(vec![
        ("EF_ENR_5_1_EN.txt", ENR_5_1),
        ("EF_AD_2_EFHK_EN.txt", EFHK),
        ("README.txt", "not AIP data"),
    ]);
    let cache = Arc::new(MemoryDatasetCache::new());
    let engine = SyncEngine::new(probe.clone(), fetcher.clone(), cache.clone());

    let dataset = engine.init(work.path()).await.unwrap();
    assert_eq!(dataset.aerodromes.len(), 1);
    assert_eq!(dataset.aerodromes[0].icao, "EFHK");
    assert_eq!(dataset.prohibited_areas.len(), 1);
    assert!(dataset.tma.is_empty());
    assert_eq!(cache.len(), 1);

    let status = engine.status().await.unwrap();
    assert_eq!(status.skipped_records, 1);
    assert_eq!(
        status.files("*.txt").unwrap(),
        vec!["EF_AD_2_EFHK_EN.txt", "EF_ENR_5_1_EN.txt", "README.txt"]
    );
    assert_eq!(status.files("EF_ENR*").unwrap(), vec!["EF_ENR_5_1_EN.txt"]);
    assert!(matches!(
        status.files("[").unwrap_err(),
        SyncError::InvalidPattern { .. }
    ));

    let first = engine.current().await.unwrap();
    let second = engine.current().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first, dataset);
    assert_eq!(probe.calls(), 1);
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn restart_is_served_from_cache() {
    let work = tempfile::tempdir().unwrap();
    let cache = Arc::new(MemoryDatasetCache::new());
    let fetcher = FakeFetcher::with_files(vec![("EF_AD_2_EFHK_EN.txt", EFHK)]);

    let first = SyncEngine::new(FakeProbe::new(Ok(june_edition())), fetcher.clone(), cache.clone())
        .init(work.path())
        .await
        .unwrap();

    let engine = SyncEngine::new(FakeProbe::new(Ok(june_edition())), fetcher.clone(), cache.clone());
    let second = engine.init(work.path()).await.unwrap();

    assert_eq!(*first, *second);
    assert_eq!(fetcher.calls(), 1);
    assert!(engine.status().await.unwrap().cache_hit);
}

#[tokio::test]
async fn new_window_triggers_fresh_parse() {
    let work = tempfile::tempdir().unwrap();
    let probe = FakeProbe::new(Ok(june_edition()));
    let fetcher = FakeFetcher::with_files(vec![]);
    let cache = Arc::new(MemoryDatasetCache::new());
    let engine = SyncEngine::new(probe.clone(), fetcher.clone(), cache.clone());

    let open = engine.init(work.path()).await.unwrap();

    // same start, but the publisher now announces an end date
    probe.publish(Ok(edition(
        "2010-06-23",
        ValidityWindow::new(day(2010, 6, 23), Some(day(2010, 7, 21))),
    )));
    let closed = engine.init(work.path()).await.unwrap();

    assert_ne!(open.cache_key(), closed.cache_key());
    assert_eq!(closed.valid_until, Some(day(2010, 7, 21)));
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(cache.len(), 2);
    assert_eq!(engine.current().await.unwrap(), closed);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn probe_failure_is_stored_and_resurfaced() {
    let work = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with_files(vec![]);
    let cache = Arc::new(MemoryDatasetCache::new());
    let err = ProbeError::NoCurrentEdition("https://ais.fi".to_string());
    let engine = SyncEngine::new(
        FakeProbe::new(Err(err.clone())),
        fetcher.clone(),
        cache.clone(),
    );

    let expected = SyncError::Probe(err);
    assert_eq!(engine.init(work.path()).await.unwrap_err(), expected);
    assert_eq!(engine.state(), SyncState::Failed(expected.clone()));
    assert_eq!(engine.status().await.unwrap_err(), expected);
    assert_eq!(engine.current().await.unwrap_err(), expected);
    assert_eq!(fetcher.calls(), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn fetch_failure_caches_nothing() {
    let work = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(FakeFetcher {
        error: Some(FetchError::Status {
            url: "https://ais.fi/files/aip/part1.iso".to_string(),
            status: 404,
        }),
        ..Default::default()
    });
    let cache = Arc::new(MemoryDatasetCache::new());
    let engine = SyncEngine::new(FakeProbe::new(Ok(june_edition())), fetcher, cache.clone());

    let err = engine.init(work.path()).await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch(FetchError::Status { status: 404, .. })));
    assert_eq!(cache.set_count(), 0);
}

#[tokio::test]
async fn unrecognised_file_fails_parse_and_caches_nothing() {
    let work = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with_files(vec![("EF_ENR_2_1_EN.txt", "garbage\n")]);
    let cache = Arc::new(MemoryDatasetCache::new());
    let engine = SyncEngine::new(FakeProbe::new(Ok(june_edition())), fetcher, cache.clone());

    let err = engine.init(work.path()).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Parse(ParseError::Structure { ref path, .. }) if path == "EF_ENR_2_1_EN.txt"
    ));
    assert!(cache.is_empty());
    assert!(matches!(engine.state(), SyncState::Failed(SyncError::Parse(_))));
}

#[tokio::test]
async fn corrupt_cache_entry_is_treated_as_miss() {
    let work = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with_files(vec![]);
    let cache = Arc::new(FailingReads {
        error: StorageError::CorruptEntry {
            key: "2010-06-23T00:00:00.000Z/..".to_string(),
            reason: "truncated".to_string(),
        },
        inner: MemoryDatasetCache::new(),
    });
    let engine = SyncEngine::new(FakeProbe::new(Ok(june_edition())), fetcher.clone(), cache.clone());

    engine.init(work.path()).await.unwrap();
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.inner.set_count(), 1);
}

#[tokio::test]
async fn cache_backend_failure_is_fatal() {
    let work = tempfile::tempdir().unwrap();
    let fetcher = FakeFetcher::with_files(vec![]);
    let cache = Arc::new(FailingReads {
        error: StorageError::Backend("disk on fire".to_string()),
        inner: MemoryDatasetCache::new(),
    });
    let engine = SyncEngine::new(FakeProbe::new(Ok(june_edition())), fetcher.clone(), cache);

    let err = engine.init(work.path()).await.unwrap_err();
    assert_eq!(err, SyncError::Cache(StorageError::Backend("disk on fire".to_string())));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn failure_after_success_replaces_ready_state() {
    let work = tempfile::tempdir().unwrap();
    let probe = FakeProbe::new(Ok(june_edition()));
    let engine = SyncEngine::new(
        probe.clone(),
        FakeFetcher::with_files(vec![]),
        Arc::new(MemoryDatasetCache::new()),
    );
    engine.init(work.path()).await.unwrap();

    probe.publish(Err(ProbeError::Status {
        url: "https://ais.fi".to_string(),
        status: 503,
    }));
    engine.init(work.path()).await.unwrap_err();
    assert!(matches!(
        engine.current().await.unwrap_err(),
        SyncError::Probe(ProbeError::Status { status: 503, .. })
    ));
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_init_is_rejected_and_queries_wait() {
    let work = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let engine = Arc::new(SyncEngine::new(
        FakeProbe::new(Ok(june_edition())),
        FakeFetcher::gated(entered.clone(), release.clone()),
        Arc::new(MemoryDatasetCache::new()),
    ));

    let first = {
        let engine = engine.clone();
        let dir = work.path().to_path_buf();
        tokio::spawn(async move { engine.init(dir).await })
    };
    entered.notified().await;
    assert_eq!(engine.state(), SyncState::Syncing);

    assert_eq!(
        engine.init(work.path()).await.unwrap_err(),
        SyncError::InProgress
    );

    let waiting_status = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.status().await })
    };
    tokio::task::yield_now().await;
    assert!(!waiting_status.is_finished());

    release.notify_one();
    let dataset = first.await.unwrap().unwrap();
    let status = waiting_status.await.unwrap().unwrap();
    assert_eq!(status.cycle, dataset.cycle);
}

#[tokio::test]
async fn cancelled_first_init_restores_uninitialized() {
    let work = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let engine = Arc::new(SyncEngine::new(
        FakeProbe::new(Ok(june_edition())),
        FakeFetcher::gated(entered.clone(), release),
        Arc::new(MemoryDatasetCache::new()),
    ));

    let task = {
        let engine = engine.clone();
        let dir = work.path().to_path_buf();
        tokio::spawn(async move { engine.init(dir).await })
    };
    entered.notified().await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(engine.state(), SyncState::Uninitialized);
    assert_eq!(engine.status().await.unwrap_err(), SyncError::NotInitialized);
}

#[tokio::test]
async fn cancelled_reinit_leaves_cancelled_failure() {
    let work = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let probe = FakeProbe::new(Ok(june_edition()));

    // June is already cached, so the first init never reaches the fetcher
    let june = june_edition();
    let cache = Arc::new(MemoryDatasetCache::new());
    cache
        .set(
            &june.window.cache_key(),
            &ParsedDataset::empty(june.cycle.clone(), june.window),
        )
        .await
        .unwrap();

    let engine = Arc::new(SyncEngine::new(
        probe.clone(),
        FakeFetcher::gated(entered.clone(), Arc::new(Notify::new())),
        cache,
    ));
    engine.init(work.path()).await.unwrap();

    probe.publish(Ok(edition(
        "2010-07-21",
        ValidityWindow::open_ended(day(2010, 7, 21)),
    )));
    let task = {
        let engine = engine.clone();
        let dir = work.path().to_path_buf();
        tokio::spawn(async move { engine.init(dir).await })
    };
    entered.notified().await;
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(engine.state(), SyncState::Failed(SyncError::Cancelled));
    assert_eq!(engine.current().await.unwrap_err(), SyncError::Cancelled);
}

#[tokio::test]
async fn timeout_fails_the_attempt() {
    let work = tempfile::tempdir().unwrap();
    let entered = Arc::new(Notify::new());
    let cache = Arc::new(MemoryDatasetCache::new());
    let engine = SyncEngine::new(
        FakeProbe::new(Ok(june_edition())),
        FakeFetcher::gated(entered, Arc::new(Notify::new())),
        cache.clone(),
    )
    .with_timeout(Duration::from_millis(50));

    let err = engine.init(work.path()).await.unwrap_err();
    assert_eq!(err, SyncError::Timeout(Duration::from_millis(50)));
    assert_eq!(engine.state(), SyncState::Failed(err));
    assert!(cache.is_empty());
}
