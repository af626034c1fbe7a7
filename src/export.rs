use std::path::Path;

use anyhow::anyhow;
use serde::Serialize;

use crate::models::{Dataset, Indicator};
use crate::output;

/// One row of the researcher download.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    date: String,
    state_code: &'a str,
    state_name: &'a str,
    financial_anxiety_index: String,
    food_insecurity_index: String,
    housing_stress_index: String,
    affordability_index: String,
}

fn format_value(dataset: &Dataset, code: &str, indicator: Indicator) -> String {
    dataset
        .value(code, indicator.key())
        .map(|value| format!("{value:.2}"))
        .unwrap_or_default()
}

pub fn to_csv(dataset: &Dataset) -> anyhow::Result<Vec<u8>> {
    let date = dataset.meta.generated.date_naive().to_string();
    let mut writer = csv::Writer::from_writer(Vec::new());

    for (code, state) in dataset.states.iter() {
        writer.serialize(ExportRow {
            date: date.clone(),
            state_code: code,
            state_name: &state.name,
            financial_anxiety_index: format_value(dataset, code, Indicator::FinancialAnxiety),
            food_insecurity_index: format_value(dataset, code, Indicator::FoodInsecurity),
            housing_stress_index: format_value(dataset, code, Indicator::HousingStress),
            affordability_index: format_value(dataset, code, Indicator::Affordability),
        })?;
    }

    writer
        .into_inner()
        .map_err(|err| anyhow!("failed to flush csv export: {}", err.error()))
}

/// Writes the CSV and returns the number of state rows.
pub fn write_csv(dataset: &Dataset, path: &Path) -> anyhow::Result<usize> {
    let bytes = to_csv(dataset)?;
    output::write_atomic(path, &bytes)?;
    Ok(dataset.states.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndicatorValue, Meta, StateRecord};
    use chrono::{TimeZone, Utc};
    use serde_json::Map;
    use std::collections::BTreeMap;

    fn dataset() -> Dataset {
        let mut dc = StateRecord::new("District of Columbia", "DC");
        dc.indicators
            .insert("financial_anxiety".into(), IndicatorValue::new(142.0, Some(3.1)));
        dc.indicators
            .insert("housing_stress".into(), IndicatorValue::new(201.5, None));
        dc.indicators
            .insert("food_insecurity".into(), IndicatorValue::missing());

        Dataset {
            meta: Meta {
                generated: Utc.with_ymd_and_hms(2026, 2, 21, 5, 24, 12).unwrap(),
                version: "2.2".into(),
                source: "BLS".into(),
                update_frequency: "daily".into(),
                data_sources: BTreeMap::new(),
                extra: Map::new(),
            },
            national: BTreeMap::new(),
            states: BTreeMap::from([("US-DC".to_string(), dc)]),
            timeseries: BTreeMap::new(),
            indicators: BTreeMap::new(),
        }
    }

    #[test]
    fn rows_carry_two_decimal_values() {
        let csv = String::from_utf8(to_csv(&dataset()).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("date,state_code,state_name,financial_anxiety_index,food_insecurity_index,housing_stress_index,affordability_index")
        );
        assert_eq!(
            lines.next(),
            Some("2026-02-21,US-DC,District of Columbia,142.00,,201.50,")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn write_csv_reports_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        assert_eq!(write_csv(&dataset(), &path).unwrap(), 1);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let records: Vec<csv::StringRecord> = reader.records().map(|record| record.unwrap()).collect();
        assert_eq!(&records[0][2], "District of Columbia");
    }
}
