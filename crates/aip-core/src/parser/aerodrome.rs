//! AD 2 aerodrome pages (one file per aerodrome).

use std::sync::OnceLock;

use aip_state::{Aerodrome, Runway};
use regex::Regex;

use super::coords::{position_from_captures, PAIR};

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(EF[A-Z]{2})\s*[-–—]\s*(\S.*?)\s*$").expect("valid header regex")
    })
}

fn arp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?s)\bARP\b.{{0,200}}?{PAIR}")).expect("valid ARP regex")
    })
}

fn elevation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bELEV(?:ATION)?\b[^\d\n-]{0,40}(-?\d+)\s*FT\b").expect("valid elevation regex")
    })
}

fn runway_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^\s*RWY\s+(\d{2}[LRC]?)\s*/\s*(\d{2}[LRC]?)(?:\s+(\d+)\s*[x×]\s*(\d+))?",
        )
        .expect("valid runway regex")
    })
}

/// Parse one aerodrome page. `Err` carries the reason the record was skipped.
pub fn parse_aerodrome(text: &str) -> Result<Aerodrome, String> {
    let header = header_re()
        .captures(text)
        .ok_or_else(|| "no `ICAO - NAME` heading".to_string())?;
    let icao = header[1].to_string();
    let name = header[2].to_string();

    let arp = arp_re()
        .captures(text)
        .ok_or_else(|| format!("{icao}: no ARP coordinates"))?;
    let coordinates = position_from_captures(&arp, 1).map_err(|e| format!("{icao}: ARP {e}"))?;

    let elevation = elevation_re()
        .captures(text)
        .and_then(|c| c[1].parse::<i32>().ok());

    let runways = runway_re()
        .captures_iter(text)
        .map(|c| Runway {
            designator: format!("{}/{}", &c[1], &c[2]),
            length: c.get(3).and_then(|m| m.as_str().parse().ok()),
            width: c.get(4).and_then(|m| m.as_str().parse().ok()),
        })
        .collect();

    Ok(Aerodrome {
        icao,
        name,
        coordinates,
        elevation,
        runways,
    })
}
