//! Census Bureau APIs: SAIPE poverty rates and ACS rent figures.
//!
//! Both endpoints answer with a JSON table whose first row is the header, so
//! columns are looked up by name rather than position.

use std::collections::BTreeMap;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::http::{send_json, FetchError, RetryPolicy};
use crate::states;

const SAIPE_URL: &str = "https://api.census.gov/data/timeseries/poverty/saipe";
const ACS_URL_PREFIX: &str = "https://api.census.gov/data";
/// How many years back to look for a published vintage.
const YEAR_FALLBACKS: i32 = 3;

const POVERTY_ALL: &str = "SAEPOVRTALL_PT";
const POVERTY_CHILD: &str = "SAEPOVRT0_17_PT";
const MEDIAN_GROSS_RENT: &str = "B25064_001E";
const RENT_PCT_OF_INCOME: &str = "B25071_001E";

#[derive(Debug, Clone, PartialEq)]
pub struct Poverty {
    pub poverty_rate: f64,
    pub child_poverty_rate: Option<f64>,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcsRent {
    pub median_rent: Option<f64>,
    /// Median gross rent as a percentage of household income.
    pub rent_burden: Option<f64>,
    pub year: i32,
}

type CensusTable = Vec<Vec<Value>>;

fn cell_number(cell: &Value) -> Option<f64> {
    let number = match cell {
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        Value::Number(number) => number.as_f64()?,
        _ => return None,
    };
    // Census uses large negative sentinels for suppressed estimates.
    (number >= 0.0).then_some(number)
}

/// Rows of the table keyed by state abbreviation, with the requested columns
/// in the order given. Rows for territories are dropped.
fn parse_table(table: &CensusTable, fields: &[&str]) -> BTreeMap<&'static str, Vec<Option<f64>>> {
    let mut rows = BTreeMap::new();
    let Some((header, body)) = table.split_first() else {
        return rows;
    };

    let position = |name: &str| header.iter().position(|cell| cell.as_str() == Some(name));
    let Some(state_column) = position("state") else {
        return rows;
    };
    let columns: Vec<Option<usize>> = fields.iter().map(|field| position(field)).collect();

    for row in body {
        let Some(info) = row
            .get(state_column)
            .and_then(Value::as_str)
            .and_then(states::by_fips)
        else {
            continue;
        };

        let values = columns
            .iter()
            .map(|column| column.and_then(|index| row.get(index)).and_then(cell_number))
            .collect();
        rows.insert(info.abbr, values);
    }

    rows
}

fn parse_poverty(table: &CensusTable, year: i32) -> BTreeMap<String, Poverty> {
    parse_table(table, &[POVERTY_ALL, POVERTY_CHILD])
        .into_iter()
        .filter_map(|(abbr, values)| {
            let poverty_rate = values.first().copied().flatten()?;
            Some((
                abbr.to_string(),
                Poverty {
                    poverty_rate,
                    child_poverty_rate: values.get(1).copied().flatten(),
                    year,
                },
            ))
        })
        .collect()
}

fn parse_acs_rent(table: &CensusTable, year: i32) -> BTreeMap<String, AcsRent> {
    parse_table(table, &[MEDIAN_GROSS_RENT, RENT_PCT_OF_INCOME])
        .into_iter()
        .filter_map(|(abbr, values)| {
            let median_rent = values.first().copied().flatten();
            let rent_burden = values.get(1).copied().flatten();
            if median_rent.is_none() && rent_burden.is_none() {
                return None;
            }
            Some((
                abbr.to_string(),
                AcsRent {
                    median_rent,
                    rent_burden,
                    year,
                },
            ))
        })
        .collect()
}

async fn fetch_saipe_year(
    client: &Client,
    api_key: &str,
    year: i32,
    policy: &RetryPolicy,
) -> Result<CensusTable, FetchError> {
    let get = format!("NAME,{POVERTY_ALL},{POVERTY_CHILD}");
    let time = year.to_string();
    send_json(
        || {
            client.get(SAIPE_URL).query(&[
                ("get", get.as_str()),
                ("for", "state:*"),
                ("time", time.as_str()),
                ("key", api_key),
            ])
        },
        policy,
    )
    .await
}

async fn fetch_acs_year(
    client: &Client,
    api_key: &str,
    year: i32,
    policy: &RetryPolicy,
) -> Result<CensusTable, FetchError> {
    let url = format!("{ACS_URL_PREFIX}/{year}/acs/acs1");
    let get = format!("NAME,{MEDIAN_GROSS_RENT},{RENT_PCT_OF_INCOME}");
    send_json(
        || {
            client.get(&url).query(&[
                ("get", get.as_str()),
                ("for", "state:*"),
                ("key", api_key),
            ])
        },
        policy,
    )
    .await
}

/// Poverty rates from the newest SAIPE vintage available, starting with the
/// year before `current_year`.
pub async fn fetch_poverty(
    client: &Client,
    api_key: Option<&str>,
    current_year: i32,
    policy: &RetryPolicy,
) -> Option<BTreeMap<String, Poverty>> {
    let Some(api_key) = api_key else {
        warn!("CENSUS_API_KEY not set - skipping poverty data");
        return None;
    };

    info!("fetching poverty data from Census SAIPE");
    let latest = current_year - 1;
    for year in (latest - YEAR_FALLBACKS + 1..=latest).rev() {
        match fetch_saipe_year(client, api_key, year, policy).await {
            Ok(table) => {
                let results = parse_poverty(&table, year);
                if !results.is_empty() {
                    info!(states = results.len(), year, "retrieved poverty data");
                    return Some(results);
                }
            }
            Err(err) => debug!(year, "SAIPE vintage unavailable: {err}"),
        }
    }

    warn!("no SAIPE vintage available");
    None
}

/// Median gross rent and rent burden from the newest ACS 1-year vintage.
pub async fn fetch_acs_rent(
    client: &Client,
    api_key: Option<&str>,
    current_year: i32,
    policy: &RetryPolicy,
) -> Option<BTreeMap<String, AcsRent>> {
    let Some(api_key) = api_key else {
        warn!("CENSUS_API_KEY not set - skipping rent data");
        return None;
    };

    info!("fetching rent data from Census ACS");
    let latest = current_year - 1;
    for year in (latest - YEAR_FALLBACKS + 1..=latest).rev() {
        match fetch_acs_year(client, api_key, year, policy).await {
            Ok(table) => {
                let results = parse_acs_rent(&table, year);
                if !results.is_empty() {
                    info!(states = results.len(), year, "retrieved rent data");
                    return Some(results);
                }
            }
            Err(err) => debug!(year, "ACS vintage unavailable: {err}"),
        }
    }

    warn!("no ACS vintage available");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(value: Value) -> CensusTable {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn poverty_columns_found_by_header() {
        let saipe = table(json!([
            ["NAME", "SAEPOVRTALL_PT", "SAEPOVRT0_17_PT", "time", "state"],
            ["Mississippi", "18.7", "25.6", "2024", "28"],
            ["California", "12.0", null, "2024", "06"],
            ["Puerto Rico", "40.1", "54.0", "2024", "72"]
        ]));

        let poverty = parse_poverty(&saipe, 2024);
        assert_eq!(poverty.len(), 2);
        assert_eq!(poverty["MS"].poverty_rate, 18.7);
        assert_eq!(poverty["MS"].child_poverty_rate, Some(25.6));
        assert_eq!(poverty["CA"].child_poverty_rate, None);
        assert_eq!(poverty["CA"].year, 2024);
    }

    #[test]
    fn unpadded_state_codes_resolve() {
        let saipe = table(json!([
            ["NAME", "SAEPOVRTALL_PT", "SAEPOVRT0_17_PT", "state"],
            ["Alabama", "15.6", "21.0", "1"]
        ]));
        assert!(parse_poverty(&saipe, 2023).contains_key("AL"));
    }

    #[test]
    fn acs_rent_drops_suppressed_estimates() {
        let acs = table(json!([
            ["NAME", "B25064_001E", "B25071_001E", "state"],
            ["Hawaii", "2005", "33.9", "15"],
            ["Wyoming", "-666666666", "27.1", "56"],
            ["Vermont", "-666666666", "-666666666", "50"]
        ]));

        let rent = parse_acs_rent(&acs, 2024);
        assert_eq!(rent["HI"].median_rent, Some(2005.0));
        assert_eq!(rent["HI"].rent_burden, Some(33.9));
        assert_eq!(rent["WY"].median_rent, None);
        assert_eq!(rent["WY"].rent_burden, Some(27.1));
        assert!(!rent.contains_key("VT"));
    }

    #[test]
    fn tables_without_state_column_are_empty() {
        let bad = table(json!([["NAME", "B25064_001E"], ["Ohio", "1100"]]));
        assert!(parse_acs_rent(&bad, 2024).is_empty());
        assert!(parse_poverty(&Vec::new(), 2024).is_empty());
    }
}
