use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, warn};

/// Curated housing-cost-burden figures, keyed by postal abbreviation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReferenceData {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    pub states: BTreeMap<String, ReferenceEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReferenceEntry {
    /// Share of renter households paying more than 30% of income on rent.
    #[serde(default)]
    pub cost_burdened_pct: Option<f64>,
    #[serde(default)]
    pub median_rent: Option<f64>,
}

impl ReferenceData {
    pub fn cost_burden(&self, abbr: &str) -> Option<f64> {
        self.states.get(abbr).and_then(|entry| entry.cost_burdened_pct)
    }

    pub fn median_rent(&self, abbr: &str) -> Option<f64> {
        self.states.get(abbr).and_then(|entry| entry.median_rent)
    }
}

/// Reads the calibration file. A missing or malformed file is logged and
/// yields `None`; the calculator then falls back to its built-in rent tiers.
pub fn load_reference(path: &Path) -> Option<ReferenceData> {
    match read_reference(path) {
        Ok(data) => {
            info!(
                path = %path.display(),
                states = data.states.len(),
                "loaded housing reference data"
            );
            Some(data)
        }
        Err(err) => {
            warn!(path = %path.display(), "reference data unavailable: {err:#}");
            None
        }
    }
}

fn read_reference(path: &Path) -> anyhow::Result<ReferenceData> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let data = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_partial_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("housing-burden.json");
        std::fs::write(
            &path,
            r#"{
                "source": "JCHS",
                "year": 2024,
                "states": {
                    "CA": { "cost_burdened_pct": 54.5, "median_rent": 2950 },
                    "WV": { "cost_burdened_pct": 25 }
                }
            }"#,
        )
        .unwrap();

        let data = load_reference(&path).unwrap();
        assert_eq!(data.year, Some(2024));
        assert_eq!(data.cost_burden("CA"), Some(54.5));
        assert_eq!(data.median_rent("CA"), Some(2950.0));
        assert_eq!(data.median_rent("WV"), None);
        assert_eq!(data.cost_burden("TX"), None);
    }

    #[test]
    fn missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_reference(&dir.path().join("nope.json")).is_none());
    }

    #[test]
    fn malformed_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"states\": [1, 2").unwrap();
        assert!(load_reference(&path).is_none());
    }

    #[test]
    fn bundled_reference_covers_every_state() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/reference/housing-burden.json");
        let data = load_reference(&path).unwrap();
        for info in crate::states::STATES.iter() {
            assert!(data.cost_burden(info.abbr).is_some(), "{} missing", info.abbr);
            assert!(data.median_rent(info.abbr).is_some(), "{} missing", info.abbr);
        }
    }
}
