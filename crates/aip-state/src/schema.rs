//! Dataset model shared by the cache stores and the sync engine
//!
//! - `ValidityWindow`: period during which one AIP edition is authoritative
//! - `CacheKey`: injective encoding of a window, used to index stored datasets
//! - `ParsedDataset`: canonical form of one edition (aerodromes + airspace)
//!
//! The JSON shape (camelCase keys, millisecond UTC instants, omitted open end)
//! is the persisted cache entry format.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Module for serializing chrono DateTime as `YYYY-MM-DDTHH:MM:SS.mmmZ`
mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_instant(date))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Optional variant of [`iso_millis`]; `None` is skipped at the call site
mod iso_millis_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_some(&super::format_instant(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

/// Render an instant the way it appears in keys and persisted entries.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Label of one published edition (the publication date, `YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CycleId(pub String);

impl CycleId {
    pub fn new(label: impl Into<String>) -> Self {
        CycleId(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ValidityWindow / CacheKey
// ---------------------------------------------------------------------------

/// Period for which an edition is authoritative.
///
/// `valid_until == None` means "valid until superseded" and is distinct from
/// every concrete end instant. Instants are held at millisecond precision,
/// the precision keys and persisted entries carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidityWindow {
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl ValidityWindow {
    pub fn new(valid_from: DateTime<Utc>, valid_until: Option<DateTime<Utc>>) -> Self {
        Self {
            valid_from: valid_from.trunc_subsecs(3),
            valid_until: valid_until.map(|until| until.trunc_subsecs(3)),
        }
    }

    /// Window with no announced end.
    pub fn open_ended(valid_from: DateTime<Utc>) -> Self {
        Self::new(valid_from, None)
    }

    pub fn is_open_ended(&self) -> bool {
        self.valid_until.is_none()
    }

    /// Derive the cache key for this window.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from_window(self)
    }
}

/// Deterministic, injective encoding of a [`ValidityWindow`].
///
/// Format is ISO 8601 interval notation `<from>/<until>`; an open end is
/// encoded as `..` which never parses as an instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Sentinel written in place of an absent `valid_until`.
    pub const OPEN_END: &'static str = "..";

    pub fn from_window(window: &ValidityWindow) -> Self {
        let until = window
            .valid_until
            .as_ref()
            .map(format_instant)
            .unwrap_or_else(|| Self::OPEN_END.to_string());
        CacheKey(format!("{}/{}", format_instant(&window.valid_from), until))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the window a key was derived from.
    ///
    /// Returns `None` for strings that are not keys produced by
    /// [`CacheKey::from_window`].
    pub fn parse_window(&self) -> Option<ValidityWindow> {
        let (from, until) = self.0.split_once('/')?;
        let valid_from = DateTime::parse_from_rfc3339(from).ok()?.with_timezone(&Utc);
        let valid_until = if until == Self::OPEN_END {
            None
        } else {
            Some(DateTime::parse_from_rfc3339(until).ok()?.with_timezone(&Utc))
        };
        Some(ValidityWindow::new(valid_from, valid_until))
    }
}

impl From<String> for CacheKey {
    fn from(raw: String) -> Self {
        CacheKey(raw)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Geometry / features
// ---------------------------------------------------------------------------

/// `[longitude, latitude]` in decimal degrees (GeoJSON axis order).
pub type Position = [f64; 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureCollectionTag {
    #[default]
    FeatureCollection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureTag {
    #[default]
    Feature,
}

/// Geometry of an airspace feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// Rings of positions; the first ring is the exterior, each ring closed.
    Polygon { coordinates: Vec<Vec<Position>> },
}

impl Geometry {
    /// Build a polygon from a single exterior ring, closing it if needed.
    pub fn polygon(mut ring: Vec<Position>) -> Self {
        if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
            if first != last {
                ring.push(first);
            }
        }
        Geometry::Polygon {
            coordinates: vec![ring],
        }
    }

    pub fn exterior(&self) -> &[Position] {
        match self {
            Geometry::Polygon { coordinates } => {
                coordinates.first().map(Vec::as_slice).unwrap_or(&[])
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirspaceProperties {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default)]
    pub kind: FeatureTag,
    pub properties: AirspaceProperties,
    pub geometry: Geometry,
}

impl Feature {
    pub fn new(properties: AirspaceProperties, geometry: Geometry) -> Self {
        Self {
            kind: FeatureTag::Feature,
            properties,
            geometry,
        }
    }
}

/// Ordered collection of features. An empty collection is a valid value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default)]
    pub kind: FeatureCollectionTag,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        Self {
            kind: FeatureCollectionTag::FeatureCollection,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Aerodromes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runway {
    pub designator: String,
    /// Metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aerodrome {
    pub icao: String,
    pub name: String,
    /// Aerodrome reference point
    pub coordinates: Position,
    /// Feet above mean sea level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<i32>,
    #[serde(default)]
    pub runways: Vec<Runway>,
}

// ---------------------------------------------------------------------------
// ParsedDataset
// ---------------------------------------------------------------------------

/// One edition's canonical dataset, stamped with its cycle and window.
///
/// Immutable once built; a new edition produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedDataset {
    pub cycle: CycleId,
    #[serde(with = "iso_millis")]
    pub valid_from: DateTime<Utc>,
    #[serde(
        with = "iso_millis_opt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub valid_until: Option<DateTime<Utc>>,
    pub aerodromes: Vec<Aerodrome>,
    pub prohibited_areas: FeatureCollection,
    pub tma: FeatureCollection,
}

impl ParsedDataset {
    /// Dataset with no published features for the given edition.
    pub fn empty(cycle: CycleId, window: ValidityWindow) -> Self {
        Self {
            cycle,
            valid_from: window.valid_from,
            valid_until: window.valid_until,
            aerodromes: Vec::new(),
            prohibited_areas: FeatureCollection::empty(),
            tma: FeatureCollection::empty(),
        }
    }

    pub fn window(&self) -> ValidityWindow {
        ValidityWindow::new(self.valid_from, self.valid_until)
    }

    pub fn cache_key(&self) -> CacheKey {
        self.window().cache_key()
    }
}
