//! Publisher feed configuration

use serde::{Deserialize, Serialize};

/// Fixed publication page listing the AIP image downloads.
pub const DEFAULT_ENDPOINT: &str = "https://ais.fi/en/products-and-services/aip-iso-image";

/// Default archive extractor program.
pub const DEFAULT_EXTRACTOR: &str = "7z";

/// Feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Publication page URL
    pub endpoint: String,
    /// User agent sent with every request
    pub user_agent: String,
    /// Archive extractor program (`7z` or `bsdtar`)
    pub extractor: String,
    /// Per-request timeout in seconds (`None` = no timeout)
    pub request_timeout_secs: Option<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            endpoint: std::env::var("AIPSYNC_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            user_agent: std::env::var("AIPSYNC_USER_AGENT")
                .unwrap_or_else(|_| format!("aip-sync/{}", env!("CARGO_PKG_VERSION"))),
            extractor: std::env::var("AIPSYNC_EXTRACTOR")
                .unwrap_or_else(|_| DEFAULT_EXTRACTOR.to_string()),
            request_timeout_secs: std::env::var("AIPSYNC_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

impl FeedConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Point the probe at a different publication page
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Use a different extractor program
    pub fn with_extractor(mut self, extractor: &str) -> Self {
        self.extractor = extractor.to_string();
        self
    }

    /// Build the shared HTTP client for this configuration
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(self.user_agent.clone());
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        builder.build()
    }
}
