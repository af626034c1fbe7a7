use std::path::{Path, PathBuf};

use chrono::NaiveDate;

pub const FRED_API_KEY: &str = "FRED_API_KEY";
pub const CENSUS_API_KEY: &str = "CENSUS_API_KEY";
pub const HUD_API_KEY: &str = "HUD_API_KEY";
pub const GOOGLE_TRENDS_API_KEY: &str = "GOOGLE_TRENDS_API_KEY";

/// Credentials for the keyed upstream APIs. Every key is optional: a missing
/// key only disables its source.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub fred: Option<String>,
    pub census: Option<String>,
    pub hud: Option<String>,
    pub google_trends: Option<String>,
}

impl ApiKeys {
    /// Loads keys from env vars:
    /// - `FRED_API_KEY`
    /// - `CENSUS_API_KEY`
    /// - `HUD_API_KEY`
    /// - `GOOGLE_TRENDS_API_KEY`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            fred: read(FRED_API_KEY),
            census: read(CENSUS_API_KEY),
            hud: read(HUD_API_KEY),
            google_trends: read(GOOGLE_TRENDS_API_KEY),
        }
    }
}

/// File layout under the data directory the static pages load from.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn latest_json(&self) -> PathBuf {
        self.data_dir.join("latest.json")
    }

    pub fn dashboard_script(&self) -> PathBuf {
        self.data_dir.join("dashboard-data.js")
    }

    pub fn young_adult_json(&self) -> PathBuf {
        self.data_dir.join("young-adult-data.json")
    }

    pub fn student_map_script(&self) -> PathBuf {
        self.data_dir.join("student-map-data.js")
    }

    pub fn reference(&self) -> PathBuf {
        self.data_dir.join("reference").join("housing-burden.json")
    }

    pub fn csv_export(&self) -> PathBuf {
        self.data_dir.join("finmango-financial-health-latest.csv")
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn raw_trends(&self, date: NaiveDate) -> PathBuf {
        self.raw_dir().join(format!("raw-{}.json", date.format("%Y-%m-%d")))
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new(Path::new("data"))
    }
}
