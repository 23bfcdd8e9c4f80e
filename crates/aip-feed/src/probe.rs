//! Publisher probe
//!
//! Reads the publication page and works out which AIP edition is in effect,
//! its validity window, and where to download it from.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::OnceLock;

use aip_state::{CycleId, ValidityWindow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use reqwest::Url;
use tracing::{debug, info, instrument};

use crate::config::FeedConfig;
use crate::error::ProbeError;

/// Where to fetch one edition from; an edition may be split over several parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLocator {
    pub urls: Vec<Url>,
}

/// What the publisher currently reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub cycle: CycleId,
    pub window: ValidityWindow,
    pub locator: DownloadLocator,
}

/// Source of the current edition's identity.
#[async_trait]
pub trait PublisherProbe: Send + Sync {
    async fn probe(&self) -> Result<ProbeResult, ProbeError>;
}

/// Probe that scrapes the publisher's HTML download page.
pub struct HttpPublisherProbe {
    endpoint: Url,
    http_client: reqwest::Client,
}

impl HttpPublisherProbe {
    pub fn new(config: &FeedConfig) -> Result<Self, ProbeError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| ProbeError::InvalidLink {
            href: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            endpoint,
            http_client: config.http_client()?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl PublisherProbe for HttpPublisherProbe {
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn probe(&self) -> Result<ProbeResult, ProbeError> {
        let response = self.http_client.get(self.endpoint.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                url: self.endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        let result = parse_publication_page(&body, &self.endpoint, Utc::now().date_naive())?;
        info!(
            cycle = %result.cycle,
            parts = result.locator.urls.len(),
            "publisher reports current edition"
        );
        Ok(result)
    }
}

fn row_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<tr[\s>]").expect("valid row regex"))
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).expect("valid href regex")
    })
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})\s+(JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEP|OCT|NOV|DEC)[A-Z]*\s+(\d{4})\b")
            .expect("valid date regex")
    })
}

fn month_number(abbrev: &str) -> Option<u32> {
    let m = match abbrev.to_ascii_uppercase().as_str() {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    Some(m)
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&NaiveDateTime::new(date, NaiveTime::default()))
}

/// Parse an AIP effective date such as `23 JUN 2010`.
pub fn parse_effective_date(text: &str) -> Option<NaiveDate> {
    let caps = date_re().captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Extract the current edition from the publication page.
///
/// Each table row holding a download anchor and an effective date is one
/// download part. The current edition is the latest date not after `today`;
/// the next later date, if listed, closes its window.
pub fn parse_publication_page(
    html: &str,
    base: &Url,
    today: NaiveDate,
) -> Result<ProbeResult, ProbeError> {
    let mut editions: BTreeMap<NaiveDate, Vec<Url>> = BTreeMap::new();

    for row in row_split_re().split(html).skip(1) {
        let (Some(href), Some(date)) = (href_re().captures(row), parse_effective_date(row)) else {
            continue;
        };
        let href = href[1].trim();
        let url = base.join(href).map_err(|e| ProbeError::InvalidLink {
            href: href.to_string(),
            reason: e.to_string(),
        })?;
        debug!(%date, %url, "found download row");
        editions.entry(date).or_default().push(url);
    }

    if editions.is_empty() {
        return Err(ProbeError::NoEditions(base.to_string()));
    }

    let (effective, urls) = editions
        .range(..=today)
        .next_back()
        .map(|(d, u)| (*d, u.clone()))
        .ok_or_else(|| ProbeError::NoCurrentEdition(today.to_string()))?;

    let superseded_on = editions
        .range((Bound::Excluded(effective), Bound::Unbounded))
        .next()
        .map(|(d, _)| *d);

    let window = ValidityWindow::new(midnight_utc(effective), superseded_on.map(midnight_utc));

    Ok(ProbeResult {
        cycle: CycleId::new(effective.format("%Y-%m-%d").to_string()),
        window,
        locator: DownloadLocator { urls },
    })
}
