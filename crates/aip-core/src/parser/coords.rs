//! AIP coordinate notation
//!
//! Positions are written `DDMMSS[.s]N DDDMMSS[.s]E`. Output is
//! `[lon, lat]` decimal degrees rounded to 6 places.

use std::sync::OnceLock;

use aip_state::Position;
use regex::Regex;

const EARTH_RADIUS_M: f64 = 6_371_008.8;
const METRES_PER_NM: f64 = 1852.0;

/// Vertices used to approximate a circular area.
pub const CIRCLE_SEGMENTS: usize = 32;

/// Source fragment of one coordinate pair, used inside larger patterns.
pub(crate) const PAIR: &str =
    r"(\d{2})(\d{2})(\d{2}(?:[.,]\d+)?)\s*([NS])\s*(\d{3})(\d{2})(\d{2}(?:[.,]\d+)?)\s*([EW])";

fn pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PAIR).expect("valid coordinate regex"))
}

fn circle_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?is)circle\s+(?:with\s+)?radius\s+(?:of\s+)?(\d+(?:[.,]\d+)?)\s*(NM|KM|M)\b.*?cent(?:red|ered|er)\s+(?:on|at)\s+{PAIR}"
        ))
        .expect("valid circle regex")
    })
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

fn parse_decimal(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse().ok()
}

fn dms(deg: &str, min: &str, sec: &str, max_deg: f64) -> Result<f64, String> {
    let d: f64 = deg.parse().map_err(|_| format!("bad degrees {deg}"))?;
    let m: f64 = min.parse().map_err(|_| format!("bad minutes {min}"))?;
    let s = parse_decimal(sec).ok_or_else(|| format!("bad seconds {sec}"))?;
    if m >= 60.0 || s >= 60.0 {
        return Err(format!("minutes/seconds out of range in {deg}{min}{sec}"));
    }
    let value = d + m / 60.0 + s / 3600.0;
    if value > max_deg {
        return Err(format!("{value} exceeds {max_deg} degrees"));
    }
    Ok(value)
}

/// Convert the eight captures of [`PAIR`] (starting at `first`) to a position.
pub(crate) fn position_from_captures(
    caps: &regex::Captures<'_>,
    first: usize,
) -> Result<Position, String> {
    let g = |i: usize| caps.get(first + i).map(|m| m.as_str()).unwrap_or("");
    let mut lat = dms(g(0), g(1), g(2), 90.0)?;
    let mut lon = dms(g(4), g(5), g(6), 180.0)?;
    if g(3).eq_ignore_ascii_case("S") {
        lat = -lat;
    }
    if g(7).eq_ignore_ascii_case("W") {
        lon = -lon;
    }
    Ok([round6(lon), round6(lat)])
}

/// Parse a single coordinate pair such as `601902N 0245813E`.
pub fn parse_position(text: &str) -> Result<Position, String> {
    let caps = pair_re()
        .captures(text)
        .ok_or_else(|| format!("no coordinate in {:?}", text.trim()))?;
    position_from_captures(&caps, 1)
}

/// All coordinate pairs in `text`, in order. Fails on the first invalid pair.
pub fn parse_positions(text: &str) -> Result<Vec<Position>, String> {
    pair_re()
        .captures_iter(text)
        .map(|caps| position_from_captures(&caps, 1))
        .collect()
}

/// A circular area clause: centre and radius in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub centre: Position,
    pub radius_m: f64,
}

/// Find `circle radius R NM centred on <coord>` in `text`.
pub fn parse_circle(text: &str) -> Option<Result<Circle, String>> {
    let caps = circle_re().captures(text)?;
    let radius = match parse_decimal(&caps[1]) {
        Some(r) if r > 0.0 => r,
        _ => return Some(Err(format!("bad circle radius {}", &caps[1]))),
    };
    let radius_m = match caps[2].to_ascii_uppercase().as_str() {
        "NM" => radius * METRES_PER_NM,
        "KM" => radius * 1000.0,
        _ => radius,
    };
    Some(position_from_captures(&caps, 3).map(|centre| Circle { centre, radius_m }))
}

impl Circle {
    /// Closed ring approximating the circle (flat-earth offsets, fine at AIP radii).
    pub fn to_ring(&self, segments: usize) -> Vec<Position> {
        let [lon0, lat0] = self.centre;
        let angular = self.radius_m / EARTH_RADIUS_M;
        let dlat = angular.to_degrees();
        let dlon = dlat / lat0.to_radians().cos().max(1e-6);

        let mut ring: Vec<Position> = (0..segments)
            .map(|i| {
                let bearing = 2.0 * std::f64::consts::PI * (i as f64) / (segments as f64);
                [
                    round6(lon0 + dlon * bearing.sin()),
                    round6(lat0 + dlat * bearing.cos()),
                ]
            })
            .collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        ring
    }
}
