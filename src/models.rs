use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The four Barometer indicators, in the order the calculator evaluates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    FinancialAnxiety,
    FoodInsecurity,
    HousingStress,
    Affordability,
}

impl Indicator {
    pub const ALL: [Indicator; 4] = [
        Indicator::FinancialAnxiety,
        Indicator::FoodInsecurity,
        Indicator::HousingStress,
        Indicator::Affordability,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Indicator::FinancialAnxiety => "financial_anxiety",
            Indicator::FoodInsecurity => "food_insecurity",
            Indicator::HousingStress => "housing_stress",
            Indicator::Affordability => "affordability",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Indicator::FinancialAnxiety => "Financial Anxiety",
            Indicator::FoodInsecurity => "Food Insecurity",
            Indicator::HousingStress => "Housing Stress",
            Indicator::Affordability => "Affordability",
        }
    }
}

/// One indicator's reading for one state.
///
/// Fields this crate does not model (`trend`, `unit`, `label`, ...) are kept
/// in `extra` so curated datasets survive a load/save cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IndicatorValue {
    pub fn new(value: f64, change: Option<f64>) -> Self {
        Self {
            value: Some(value),
            change,
            ..Self::default()
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }
}

/// Where the rent figure used for the housing-stress rent penalty came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RentSource {
    Acs,
    HudFmr,
    Reference,
    FallbackTiers,
}

/// Raw inputs behind a state's Barometer values, kept for traceability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub unemployment_rate: Option<f64>,
    pub poverty_rate: Option<f64>,
    #[serde(default)]
    pub child_poverty_rate: Option<f64>,
    pub median_rent: Option<f64>,
    pub housing_price_change: Option<f64>,
    /// ACS median gross rent as a percentage of household income.
    #[serde(default)]
    pub rent_burden: Option<f64>,
    /// Reference share of renters paying more than 30% of income.
    #[serde(default)]
    pub cost_burdened_pct: Option<f64>,
    #[serde(default)]
    pub fair_market_rent: Option<f64>,
    #[serde(default)]
    pub rent_source: Option<RentSource>,
    pub regional_stress_multiplier: f64,
    /// Indicator keys whose value was synthesized rather than computed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub estimated: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub name: String,
    pub abbr: String,
    #[serde(flatten)]
    pub indicators: BTreeMap<String, IndicatorValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl StateRecord {
    pub fn new(name: &str, abbr: &str) -> Self {
        Self {
            name: name.to_string(),
            abbr: abbr.to_string(),
            indicators: BTreeMap::new(),
            metrics: None,
        }
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.indicators.get(key).and_then(|reading| reading.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    /// Only found in hand-edited datasets; never produced by the aggregator.
    Stable,
}

impl Trend {
    pub fn from_change(change: f64) -> Self {
        if change >= 0.0 {
            Trend::Up
        } else {
            Trend::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NationalAggregate {
    pub value: f64,
    pub change: f64,
    pub trend: Trend,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub moderate: f64,
    pub elevated: f64,
    pub high: f64,
}

/// Display catalog entry for one indicator of the young-adult dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorMeta {
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub unit: String,
    pub format: String,
    pub higher_is_bad: bool,
    pub thresholds: Thresholds,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub generated: DateTime<Utc>,
    pub version: String,
    pub source: String,
    pub update_frequency: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data_sources: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub meta: Meta,
    #[serde(default)]
    pub national: BTreeMap<String, NationalAggregate>,
    pub states: BTreeMap<String, StateRecord>,
    /// Scope (`national`) to indicator key to monthly points.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub timeseries: BTreeMap<String, BTreeMap<String, Vec<TimeseriesPoint>>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indicators: BTreeMap<String, IndicatorMeta>,
}

impl Dataset {
    pub fn value(&self, state_code: &str, key: &str) -> Option<f64> {
        self.states.get(state_code).and_then(|state| state.value(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn indicator_keys_match_serde_names() {
        for indicator in Indicator::ALL {
            assert_eq!(serde_json::to_value(indicator).unwrap(), json!(indicator.key()));
        }
    }

    #[test]
    fn trend_follows_sign_of_change() {
        assert_eq!(Trend::from_change(0.0), Trend::Up);
        assert_eq!(Trend::from_change(2.5), Trend::Up);
        assert_eq!(Trend::from_change(-0.1), Trend::Down);
    }

    #[test]
    fn state_record_keeps_unmodelled_fields() {
        let raw = json!({
            "name": "California",
            "abbr": "CA",
            "rent_burden": { "value": 54.5, "change": -0.4, "rank": 4 },
            "financial_stress": { "value": 125, "change": 1.8, "rank": 4, "trend": "up" },
            "average_rent": {
                "value": 2950,
                "unit": "$",
                "label": "Avg Asking Rent (Zillow)",
                "source": "Zillow Observed Rent Index (ZORI) 2024"
            }
        });

        let record: StateRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.value("rent_burden"), Some(54.5));
        assert_eq!(record.indicators["financial_stress"].extra["trend"], json!("up"));

        let rent = &record.indicators["average_rent"];
        assert_eq!(rent.change, None);
        assert_eq!(rent.extra["unit"], json!("$"));

        let back = serde_json::to_value(&record).unwrap();
        assert!(back["average_rent"].get("rank").is_none());
        assert_eq!(back["average_rent"]["label"], json!("Avg Asking Rent (Zillow)"));
        assert!(back.get("metrics").is_none());
    }

    #[test]
    fn indicator_meta_uses_camel_case() {
        let raw = json!({
            "name": "YAAI",
            "fullName": "Young Adult Affordability Index",
            "description": "Weighted composite",
            "source": "FinMango Research",
            "sourceUrl": "https://finmango.org/affordability-lab",
            "unit": "score",
            "format": "index",
            "higherIsBad": true,
            "thresholds": { "low": 35.0, "moderate": 50.0, "elevated": 65.0, "high": 80.0 }
        });

        let meta: IndicatorMeta = serde_json::from_value(raw.clone()).unwrap();
        assert!(meta.higher_is_bad);
        assert_eq!(meta.thresholds.elevated, 65.0);
        assert_eq!(serde_json::to_value(&meta).unwrap(), raw);
    }
}
