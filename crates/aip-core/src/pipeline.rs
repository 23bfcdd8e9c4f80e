//! Fetch & extract pipeline
//!
//! Materialises the raw files of one cycle under `<working_dir>/<cycle>`:
//!
//! 1. An existing `<cycle>` directory is reused as-is, with no network I/O.
//! 2. Otherwise every locator part is downloaded into `<cycle>.download/`.
//! 3. Each part is extracted into the staging directory `<cycle>.partial/`.
//! 4. Staging is renamed to `<cycle>` only once every part extracted.
//!
//! A failed run leaves neither `<cycle>` nor its staging directories behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aip_feed::{
    ArchiveExtractor, CommandExtractor, DownloadLocator, Downloader, FeedConfig, FetchError,
    HttpDownloader, Url,
};
use aip_state::CycleId;
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

/// Result of materialising a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// `<working_dir>/<cycle>`
    pub dir: PathBuf,
    /// The directory already existed and nothing was downloaded
    pub reused: bool,
}

/// Produces the directory of raw files for a cycle.
#[async_trait]
pub trait DatasetFetcher: Send + Sync {
    async fn fetch(
        &self,
        locator: &DownloadLocator,
        working_dir: &Path,
        cycle: &CycleId,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Downloads every part of an edition and unpacks it.
pub struct FetchExtractPipeline {
    downloader: Arc<dyn Downloader>,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl FetchExtractPipeline {
    pub fn new(downloader: Arc<dyn Downloader>, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        Self {
            downloader,
            extractor,
        }
    }

    /// HTTP downloads and the configured extractor program.
    pub fn from_config(config: &FeedConfig) -> Result<Self, FetchError> {
        Ok(Self::new(
            Arc::new(HttpDownloader::new(config)?),
            Arc::new(CommandExtractor::new(&config.extractor)),
        ))
    }

    /// Final directory for `cycle` under `working_dir`.
    pub fn cycle_dir(working_dir: &Path, cycle: &CycleId) -> Result<PathBuf, FetchError> {
        validate_cycle(cycle)?;
        Ok(working_dir.join(cycle.as_str()))
    }

    async fn download_and_extract(
        &self,
        locator: &DownloadLocator,
        download_dir: &Path,
        staging_dir: &Path,
    ) -> Result<(), FetchError> {
        tokio::fs::create_dir_all(download_dir).await?;
        tokio::fs::create_dir_all(staging_dir).await?;

        for (i, url) in locator.urls.iter().enumerate() {
            let part = download_dir.join(part_file_name(i + 1, url));
            let bytes = self.downloader.download(url, &part).await?;
            debug!(part = %part.display(), bytes = bytes, "part downloaded");
            self.extractor.extract(&part, staging_dir).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DatasetFetcher for FetchExtractPipeline {
    #[instrument(skip_all, fields(cycle = %cycle))]
    async fn fetch(
        &self,
        locator: &DownloadLocator,
        working_dir: &Path,
        cycle: &CycleId,
    ) -> Result<FetchOutcome, FetchError> {
        let dir = Self::cycle_dir(working_dir, cycle)?;
        if tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            info!(dir = %dir.display(), "reusing extracted cycle");
            return Ok(FetchOutcome { dir, reused: true });
        }
        if locator.urls.is_empty() {
            return Err(FetchError::EmptyLocator(cycle.to_string()));
        }

        tokio::fs::create_dir_all(working_dir).await?;
        let download_dir = working_dir.join(format!("{cycle}.download"));
        let staging_dir = working_dir.join(format!("{cycle}.partial"));
        remove_dir_if_exists(&download_dir).await?;
        remove_dir_if_exists(&staging_dir).await?;

        let result = match self
            .download_and_extract(locator, &download_dir, &staging_dir)
            .await
        {
            Ok(()) => tokio::fs::rename(&staging_dir, &dir)
                .await
                .map_err(FetchError::from),
            Err(e) => Err(e),
        };

        if let Err(e) = remove_dir_if_exists(&download_dir).await {
            warn!(dir = %download_dir.display(), error = %e, "could not remove download directory");
        }
        match result {
            Ok(()) => {
                info!(dir = %dir.display(), parts = locator.urls.len(), "cycle extracted");
                Ok(FetchOutcome { dir, reused: false })
            }
            Err(e) => {
                if let Err(cleanup) = remove_dir_if_exists(&staging_dir).await {
                    warn!(dir = %staging_dir.display(), error = %cleanup, "could not remove staging directory");
                }
                Err(e)
            }
        }
    }
}

fn validate_cycle(cycle: &CycleId) -> Result<(), FetchError> {
    let label = cycle.as_str();
    let bad = label.is_empty()
        || label == "."
        || label == ".."
        || label.contains(['/', '\\', '\0']);
    if bad {
        return Err(FetchError::InvalidCycle(label.to_string()));
    }
    Ok(())
}

fn part_file_name(n: usize, url: &Url) -> String {
    let ext = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("iso")
        .to_ascii_lowercase();
    format!("part-{n}.{ext}")
}

async fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
