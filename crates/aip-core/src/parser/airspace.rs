//! ENR 5.1 (prohibited, restricted and danger areas) and ENR 2.1 (TMA) pages.
//!
//! A page is a sequence of records. Each record starts on a heading line and
//! runs until the next heading; its body holds either a boundary of
//! coordinate pairs or a circle clause, plus optional vertical limits.

use std::sync::OnceLock;

use aip_state::{AirspaceProperties, Feature, Geometry};
use regex::Regex;

use super::coords::{parse_circle, parse_positions, CIRCLE_SEGMENTS};

/// Airspace page flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirspacePage {
    /// ENR 5.1; headings like `EFP12 LOVIISA` or `EF R45 ...`
    Enr51,
    /// ENR 2.1; headings like `HELSINKI TMA 2`
    Enr21,
}

impl AirspacePage {
    /// Section heading that must appear in the file.
    pub fn marker(self) -> &'static str {
        match self {
            AirspacePage::Enr51 => "ENR 5.1",
            AirspacePage::Enr21 => "ENR 2.1",
        }
    }

    fn heading_re(self) -> &'static Regex {
        static ENR51: OnceLock<Regex> = OnceLock::new();
        static ENR21: OnceLock<Regex> = OnceLock::new();
        match self {
            AirspacePage::Enr51 => ENR51.get_or_init(|| {
                Regex::new(r"(?m)^[ \t]*(EF[ \t]?[PRD][ \t]?\d+[A-Z]?)[ \t]+(\S[^\n]*?)[ \t]*$")
                    .expect("valid ENR 5.1 heading regex")
            }),
            AirspacePage::Enr21 => ENR21.get_or_init(|| {
                Regex::new(r"(?m)^[ \t]*([A-ZÄÖÅ][A-ZÄÖÅ \t-]*?[ \t]+TMA(?:[ \t]+\d+)?)[ \t]*$")
                    .expect("valid ENR 2.1 heading regex")
            }),
        }
    }
}

fn limit_re(which: &str) -> Regex {
    Regex::new(&format!(r"(?im)^[ \t]*{which}[ \t]+limit[ \t]*:?[ \t]*(\S[^\n]*?)[ \t]*$"))
        .expect("valid limit regex")
}

fn upper_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| limit_re("upper"))
}

fn lower_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| limit_re("lower"))
}

/// Records parsed from one page plus the reasons any were skipped.
#[derive(Debug, Default)]
pub struct PageOutcome {
    pub features: Vec<Feature>,
    pub skipped: Vec<(String, String)>,
}

/// Parse a page. `Err` means the page structure itself was not recognised.
pub fn parse_airspace_page(text: &str, page: AirspacePage) -> Result<PageOutcome, String> {
    let mut outcome = PageOutcome::default();
    if text.trim().is_empty() {
        return Ok(outcome);
    }
    if !text.contains(page.marker()) {
        return Err(format!("missing `{}` heading", page.marker()));
    }

    let headings: Vec<_> = page.heading_re().captures_iter(text).collect();
    for (i, heading) in headings.iter().enumerate() {
        let whole = heading.get(0).map(|m| m.end()).unwrap_or(0);
        let end = headings
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let body = &text[whole..end];

        let (label, properties) = match page {
            AirspacePage::Enr51 => {
                let designator: String = heading[1].split_whitespace().collect();
                (
                    designator.clone(),
                    AirspaceProperties {
                        name: heading[2].to_string(),
                        designator: Some(designator),
                        ..Default::default()
                    },
                )
            }
            AirspacePage::Enr21 => {
                let name = heading[1].split_whitespace().collect::<Vec<_>>().join(" ");
                (
                    name.clone(),
                    AirspaceProperties {
                        name,
                        ..Default::default()
                    },
                )
            }
        };

        match parse_record(body, properties) {
            Ok(feature) => outcome.features.push(feature),
            Err(reason) => outcome.skipped.push((label, reason)),
        }
    }
    Ok(outcome)
}

fn parse_record(body: &str, mut properties: AirspaceProperties) -> Result<Feature, String> {
    properties.upper_limit = upper_re().captures(body).map(|c| c[1].to_string());
    properties.lower_limit = lower_re().captures(body).map(|c| c[1].to_string());

    let positions = parse_positions(body)?;
    let ring = match parse_circle(body) {
        // the centre is the only pair a plain circle carries
        Some(_) if positions.len() > 1 => {
            return Err(format!(
                "boundary of {} points mixes in an arc or circle clause",
                positions.len() - 1
            ));
        }
        Some(circle) => circle?.to_ring(CIRCLE_SEGMENTS),
        None => {
            let mut ring = positions;
            if ring.first() == ring.last() && ring.len() > 1 {
                ring.pop();
            }
            if ring.len() < 3 {
                return Err(format!("boundary has {} distinct points, need 3", ring.len()));
            }
            ring
        }
    };
    Ok(Feature::new(properties, Geometry::polygon(ring)))
}
