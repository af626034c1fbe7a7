//! FRED state house price indices (`{ABBR}STHPI`).

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::http::{pause, send_json, RetryPolicy};
use crate::states;

const FRED_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
/// FRED allows 120 requests per minute.
const REQUEST_DELAY: Duration = Duration::from_millis(200);
/// Newest observation plus the twelve before it; the oldest is the
/// comparison point for the change.
const OBSERVATIONS: usize = 13;

#[derive(Debug, Clone, PartialEq)]
pub struct HousingPrice {
    pub value: f64,
    pub previous: Option<f64>,
    /// Year-over-year percent change of the index.
    pub change: Option<f64>,
    pub date: String,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

fn parse_value(raw: &str) -> Option<f64> {
    // FRED marks missing observations with "."
    raw.trim().parse::<f64>().ok()
}

/// Observations arrive newest first.
fn parse_observations(observations: &[Observation]) -> Option<HousingPrice> {
    let latest = observations.first()?;
    let value = parse_value(&latest.value)?;
    let previous = observations
        .get(OBSERVATIONS - 1)
        .and_then(|obs| parse_value(&obs.value))
        .filter(|previous| *previous != 0.0);

    Some(HousingPrice {
        value,
        previous,
        change: previous.map(|previous| (value - previous) / previous * 100.0),
        date: latest.date.clone(),
    })
}

pub async fn fetch_housing_prices(
    client: &Client,
    api_key: Option<&str>,
    policy: &RetryPolicy,
) -> Option<BTreeMap<String, HousingPrice>> {
    let Some(api_key) = api_key else {
        warn!("FRED_API_KEY not set - skipping housing price data");
        return None;
    };

    info!("fetching housing price data from FRED");
    let limit = OBSERVATIONS.to_string();
    let mut results = BTreeMap::new();

    for (index, info) in states::STATES.iter().enumerate() {
        if index > 0 {
            pause(REQUEST_DELAY).await;
        }

        let series_id = format!("{}STHPI", info.abbr);
        let response = send_json::<ObservationsResponse, _>(
            || {
                client.get(FRED_URL).query(&[
                    ("series_id", series_id.as_str()),
                    ("api_key", api_key),
                    ("file_type", "json"),
                    ("limit", limit.as_str()),
                    ("sort_order", "desc"),
                ])
            },
            policy,
        )
        .await;

        match response {
            Ok(body) => {
                if let Some(price) = parse_observations(&body.observations) {
                    results.insert(info.abbr.to_string(), price);
                }
            }
            Err(err) => warn!(state = info.abbr, "could not fetch housing data: {err}"),
        }
    }

    info!(states = results.len(), "retrieved housing price data");
    if results.is_empty() {
        None
    } else {
        Some(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observations(values: &[&str]) -> Vec<Observation> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| Observation {
                date: format!("2026-{:02}-01", 12 - i.min(11)),
                value: value.to_string(),
            })
            .collect()
    }

    #[test]
    fn change_is_year_over_year_percent() {
        let mut values = vec!["110.0"];
        values.extend(std::iter::repeat("105.0").take(11));
        values.push("100.0");

        let price = parse_observations(&observations(&values)).unwrap();
        assert_eq!(price.value, 110.0);
        assert_eq!(price.previous, Some(100.0));
        assert!((price.change.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn short_history_has_no_change() {
        let price = parse_observations(&observations(&["410.2", "405.0"])).unwrap();
        assert_eq!(price.previous, None);
        assert_eq!(price.change, None);
    }

    #[test]
    fn missing_latest_observation_is_skipped() {
        assert!(parse_observations(&observations(&[".", "405.0"])).is_none());
        assert!(parse_observations(&[]).is_none());
    }
}
