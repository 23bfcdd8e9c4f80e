//! Download of edition image parts

use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::config::FeedConfig;
use crate::error::FetchError;

/// Fetches one remote file to a local path.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` to `dest`, returning the number of bytes written.
    ///
    /// `dest` only appears once the download has completed.
    async fn download(&self, url: &Url, dest: &Path) -> Result<u64, FetchError>;
}

/// reqwest-backed downloader streaming the body to disk chunk by chunk.
pub struct HttpDownloader {
    http_client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(config: &FeedConfig) -> Result<Self, FetchError> {
        Ok(Self {
            http_client: config.http_client()?,
        })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[instrument(skip_all, fields(url = %url))]
    async fn download(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        let mut response = self.http_client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let partial = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&partial).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&partial, dest).await?;
        debug!(bytes = written, dest = %dest.display(), "download complete");
        info!(bytes = written, "downloaded image part");
        Ok(written)
    }
}
