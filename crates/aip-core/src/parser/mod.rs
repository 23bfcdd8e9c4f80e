//! Dataset parser
//!
//! Turns an extracted cycle directory into aerodromes, prohibited areas and
//! TMA features. The transformation is pure: the same directory always gives
//! the same output.
//!
//! Each raw file kind is a [`SourceKind`] with its own discovery glob and
//! record grammar. Files are matched case-insensitively anywhere under the
//! directory and processed in sorted path order. Individual malformed records
//! are skipped and reported; a file whose structure is not recognised fails the
//! whole parse.

pub mod aerodrome;
pub mod airspace;
pub mod coords;

use std::collections::BTreeMap;
use std::path::Path;

use aip_state::{Aerodrome, CycleId, Feature, FeatureCollection, ParsedDataset, ValidityWindow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::files::glob_relative;

use airspace::AirspacePage;

/// Raw file kinds in an extracted AIP image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// AD 2 pages, one file per aerodrome
    Aerodrome,
    /// ENR 5.1 prohibited, restricted and danger areas
    ProhibitedAreas,
    /// ENR 2.1 terminal control areas
    Tma,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Aerodrome,
        SourceKind::ProhibitedAreas,
        SourceKind::Tma,
    ];

    /// Discovery glob, relative to the cycle directory.
    pub fn pattern(self) -> &'static str {
        match self {
            SourceKind::Aerodrome => "**/*AD_2_EF??*.txt",
            SourceKind::ProhibitedAreas => "**/*ENR_5_1*.txt",
            SourceKind::Tma => "**/*ENR_2_1*.txt",
        }
    }

    /// Files of this kind under `dir`, sorted.
    pub fn discover(self, dir: &Path) -> Result<Vec<String>, ParseError> {
        glob_relative(dir, self.pattern(), false).map_err(|e| ParseError::Io(e.to_string()))
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceKind::Aerodrome => "aerodrome",
            SourceKind::ProhibitedAreas => "prohibited_areas",
            SourceKind::Tma => "tma",
        };
        write!(f, "{s}")
    }
}

/// A record that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub kind: SourceKind,
    /// File path relative to the parsed directory
    pub path: String,
    /// Record label when one could be read
    pub record: Option<String>,
    pub reason: String,
}

/// What the parser looked at and what it skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    pub files: Vec<String>,
    pub warnings: Vec<ParseWarning>,
}

/// Parser output before the cycle and window are stamped on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSources {
    pub aerodromes: Vec<Aerodrome>,
    pub prohibited_areas: FeatureCollection,
    pub tma: FeatureCollection,
    pub report: ParseReport,
}

impl ParsedSources {
    pub fn into_dataset(self, cycle: CycleId, window: ValidityWindow) -> ParsedDataset {
        let mut dataset = ParsedDataset::empty(cycle, window);
        dataset.aerodromes = self.aerodromes;
        dataset.prohibited_areas = self.prohibited_areas;
        dataset.tma = self.tma;
        dataset
    }
}

fn read_text(dir: &Path, rel: &str) -> Result<String, ParseError> {
    let bytes = std::fs::read(dir.join(rel))?;
    String::from_utf8(bytes).map_err(|_| ParseError::Encoding {
        path: rel.to_string(),
    })
}

fn record_warning(
    report: &mut ParseReport,
    kind: SourceKind,
    path: &str,
    record: Option<String>,
    reason: String,
) {
    warn!(
        event = "parse.record_skipped",
        kind = %kind,
        path = %path,
        record = record.as_deref().unwrap_or(""),
        reason = %reason,
    );
    report.warnings.push(ParseWarning {
        kind,
        path: path.to_string(),
        record,
        reason,
    });
}

fn parse_aerodromes(dir: &Path, report: &mut ParseReport) -> Result<Vec<Aerodrome>, ParseError> {
    let mut by_icao: BTreeMap<String, Aerodrome> = BTreeMap::new();
    for rel in SourceKind::Aerodrome.discover(dir)? {
        let text = read_text(dir, &rel)?;
        report.files.push(rel.clone());
        if text.trim().is_empty() {
            continue;
        }
        match aerodrome::parse_aerodrome(&text) {
            Ok(ad) => {
                if by_icao.contains_key(&ad.icao) {
                    let icao = ad.icao.clone();
                    record_warning(
                        report,
                        SourceKind::Aerodrome,
                        &rel,
                        Some(icao),
                        "duplicate aerodrome, keeping the first".to_string(),
                    );
                } else {
                    by_icao.insert(ad.icao.clone(), ad);
                }
            }
            Err(reason) => record_warning(report, SourceKind::Aerodrome, &rel, None, reason),
        }
    }
    Ok(by_icao.into_values().collect())
}

fn parse_airspace(
    dir: &Path,
    kind: SourceKind,
    page: AirspacePage,
    report: &mut ParseReport,
) -> Result<FeatureCollection, ParseError> {
    let mut features: Vec<Feature> = Vec::new();
    for rel in kind.discover(dir)? {
        let text = read_text(dir, &rel)?;
        report.files.push(rel.clone());
        let outcome = airspace::parse_airspace_page(&text, page).map_err(|reason| {
            ParseError::Structure {
                path: rel.clone(),
                reason,
            }
        })?;
        for (label, reason) in outcome.skipped {
            record_warning(report, kind, &rel, Some(label), reason);
        }
        features.extend(outcome.features);
    }
    Ok(FeatureCollection::from_features(features))
}

/// Parse every recognised file under `dir`.
///
/// Blocking; async callers should run it on the blocking pool.
pub fn parse_directory(dir: &Path) -> Result<ParsedSources, ParseError> {
    let mut report = ParseReport::default();
    let aerodromes = parse_aerodromes(dir, &mut report)?;
    let prohibited_areas = parse_airspace(
        dir,
        SourceKind::ProhibitedAreas,
        AirspacePage::Enr51,
        &mut report,
    )?;
    let tma = parse_airspace(dir, SourceKind::Tma, AirspacePage::Enr21, &mut report)?;

    debug!(
        event = "parse.finished",
        dir = %dir.display(),
        files = report.files.len(),
        aerodromes = aerodromes.len(),
        prohibited_areas = prohibited_areas.len(),
        tma = tma.len(),
        warnings = report.warnings.len(),
    );

    Ok(ParsedSources {
        aerodromes,
        prohibited_areas,
        tma,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn write(dir: &Path, rel: &str, text: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    const EFHK: &str = "EFHK - HELSINKI-VANTAA\nARP 601902N 0245813E\nElevation 179 FT\n";
    const EFTP: &str = "EFTP - TAMPERE-PIRKKALA\nARP 612458N 0233616E\n";

    #[test]
    fn test_empty_directory_gives_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let parsed = parse_directory(dir.path()).unwrap();
        assert!(parsed.aerodromes.is_empty());
        assert!(parsed.prohibited_areas.is_empty());
        assert!(parsed.tma.is_empty());
        assert!(parsed.report.files.is_empty());
    }

    #[test]
    fn test_aerodromes_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "AIP/AD/EF_AD_2_EFTP_EN.txt", EFTP);
        write(dir.path(), "AIP/AD/EF_AD_2_EFHK_EN.txt", EFHK);
        write(dir.path(), "AIP/AD/ef_ad_2_efhk_fi.txt", EFHK);
        write(dir.path(), "AIP/AD/EF_AD_2_EFXX_EN.txt", "nothing useful here");
        write(dir.path(), "AIP/AD/EF_AD_2_EFYY_EN.txt", "");

        let parsed = parse_directory(dir.path()).unwrap();
        let icaos: Vec<_> = parsed.aerodromes.iter().map(|a| a.icao.as_str()).collect();
        assert_eq!(icaos, vec!["EFHK", "EFTP"]);
        assert_eq!(parsed.report.files.len(), 5);

        let reasons: Vec<_> = parsed
            .report
            .warnings
            .iter()
            .map(|w| w.path.as_str())
            .collect();
        assert_eq!(
            reasons,
            vec!["AIP/AD/EF_AD_2_EFXX_EN.txt", "AIP/AD/ef_ad_2_efhk_fi.txt"]
        );
    }

    #[test]
    fn test_airspace_files_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "b/EF_ENR_5_1_EN.txt",
            "ENR 5.1\nEFP2 SECOND\n600000N 0240000E - 601000N 0240000E - 601000N 0241000E\n",
        );
        write(
            dir.path(),
            "a/EF_ENR_5_1_EN.txt",
            "ENR 5.1\nEFP1 FIRST\n600000N 0250000E - 601000N 0250000E - 601000N 0251000E\n",
        );
        write(
            dir.path(),
            "EF_ENR_2_1_EN.txt",
            "ENR 2.1\nHELSINKI TMA\n600000N 0240000E - 603000N 0240000E - 603000N 0250000E\n",
        );

        let parsed = parse_directory(dir.path()).unwrap();
        let names: Vec<_> = parsed
            .prohibited_areas
            .features
            .iter()
            .map(|f| f.properties.name.as_str())
            .collect();
        assert_eq!(names, vec!["FIRST", "SECOND"]);
        assert_eq!(parsed.tma.len(), 1);
        assert!(parsed.report.warnings.is_empty());
    }

    #[test]
    fn test_missing_marker_fails_parse() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "EF_ENR_2_1_EN.txt", "this is not an ENR page\n");
        let err = parse_directory(dir.path()).unwrap_err();
        assert!(matches!(err, ParseError::Structure { ref path, .. } if path == "EF_ENR_2_1_EN.txt"));
    }

    #[test]
    fn test_non_utf8_fails_parse() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("EF_ENR_5_1_EN.txt"), [0xff, 0xfe, 0x00]).unwrap();
        let err = parse_directory(dir.path()).unwrap_err();
        assert_eq!(
            err,
            ParseError::Encoding {
                path: "EF_ENR_5_1_EN.txt".to_string()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdirectory_fails_parse() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "AIP/AD/EF_AD_2_EFHK_EN.txt", EFHK);
        write(dir.path(), "AIP/ENR/EF_ENR_5_1_EN.txt", "ENR 5.1\n");
        let locked = dir.path().join("AIP/ENR");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let readable = std::fs::read_dir(&locked).is_ok();
        let result = parse_directory(dir.path());
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }

        assert!(matches!(result, Err(ParseError::Io(ref msg)) if msg.contains("ENR")));
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.txt", "hello");
        write(dir.path(), "EF_GEN_1_EN.txt", "GEN 1");
        let parsed = parse_directory(dir.path()).unwrap();
        assert!(parsed.report.files.is_empty());
    }

    #[test]
    fn test_into_dataset_stamps_cycle_and_window() {
        let window = ValidityWindow::open_ended(Utc.with_ymd_and_hms(2010, 6, 23, 0, 0, 0).unwrap());
        let dataset = ParsedSources::default().into_dataset(CycleId::new("2010-06-23"), window);
        assert_eq!(dataset, ParsedDataset::empty(CycleId::new("2010-06-23"), window));
    }

    #[test]
    fn test_source_kind_patterns() {
        for kind in SourceKind::ALL {
            assert!(glob::Pattern::new(kind.pattern()).is_ok(), "{kind}");
        }
    }
}
