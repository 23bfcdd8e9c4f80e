//! AIP-Feed: Publisher Probe, Download and Extraction for AIP-SYNC
//!
//! This crate talks to the outside world: it reads the publisher's download
//! page to find the edition currently in effect, downloads its image parts
//! and unpacks them with an external archive tool.
//!
//! ## Layer 1 - Upstream
//!
//! Focus: Correct edition and window detection; no partial files left behind.

pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod probe;

#[cfg(test)]
mod test_support;

pub use config::{FeedConfig, DEFAULT_ENDPOINT, DEFAULT_EXTRACTOR};
pub use download::{Downloader, HttpDownloader};
pub use error::{FetchError, ProbeError};
pub use extract::{ArchiveExtractor, CommandExtractor, ExtractorProgram};
pub use probe::{
    parse_effective_date, parse_publication_page, DownloadLocator, HttpPublisherProbe,
    ProbeResult, PublisherProbe,
};

/// Re-exported so callers can build locators without depending on reqwest.
pub use reqwest::Url;
