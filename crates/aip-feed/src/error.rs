//! Error types for aip-feed

use thiserror::Error;

/// Errors raised while determining the current edition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Request to the publication page failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Publication page answered with a non-success status
    #[error("Publication page {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// No download rows with an effective date were found
    #[error("No published editions found on {0}")]
    NoEditions(String),

    /// Every listed edition becomes effective in the future
    #[error("No edition is in effect on {0}")]
    NoCurrentEdition(String),

    /// A download link could not be resolved to a URL
    #[error("Invalid download link {href}: {reason}")]
    InvalidLink { href: String, reason: String },
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        ProbeError::Http(err.to_string())
    }
}

/// Errors raised while downloading or extracting an edition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Download request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Download answered with a non-success status
    #[error("Download {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Filesystem error in the working directory
    #[error("IO error: {0}")]
    Io(String),

    /// The extractor program is not installed or not in PATH
    #[error("Archive extractor `{0}` is not available")]
    ExtractorUnavailable(String),

    /// The extractor ran but reported failure
    #[error("Extraction of {archive} failed: {reason}")]
    Extract { archive: String, reason: String },

    /// The locator carried no download URLs
    #[error("No download links for cycle {0}")]
    EmptyLocator(String),

    /// Cycle label cannot be used as a directory name
    #[error("Invalid cycle label {0:?}")]
    InvalidCycle(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Http(err.to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err.to_string())
    }
}
