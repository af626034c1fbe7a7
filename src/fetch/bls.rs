//! Bureau of Labor Statistics public API (v1, no key).

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::http::{pause, send_json, FetchError, RetryPolicy};
use crate::states;

const BLS_URL: &str = "https://api.bls.gov/publicAPI/v1/timeseries/data/";
const BATCH_SIZE: usize = 25;
const BATCH_DELAY: Duration = Duration::from_millis(1000);
/// National unemployment rate, ages 20-24.
const YOUTH_UNEMPLOYMENT_SERIES: &str = "LNS14000036";

#[derive(Debug, Clone, PartialEq)]
pub struct Unemployment {
    pub value: f64,
    /// Same period one year earlier.
    pub previous: Option<f64>,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YouthUnemployment {
    pub value: f64,
    /// Percentage-point change from the same period one year earlier.
    pub change: f64,
    pub date: String,
}

#[derive(Serialize)]
struct SeriesRequest<'a> {
    seriesid: &'a [String],
    startyear: String,
    endyear: String,
}

#[derive(Debug, Deserialize)]
struct BlsResponse {
    status: String,
    #[serde(rename = "Results")]
    results: Option<BlsResults>,
}

#[derive(Debug, Deserialize)]
struct BlsResults {
    #[serde(default)]
    series: Vec<BlsSeries>,
}

#[derive(Debug, Deserialize)]
struct BlsSeries {
    #[serde(rename = "seriesID")]
    series_id: String,
    #[serde(default)]
    data: Vec<BlsObservation>,
}

#[derive(Debug, Deserialize)]
struct BlsObservation {
    year: String,
    period: String,
    #[serde(rename = "periodName", default)]
    period_name: String,
    value: String,
}

/// Local Area Unemployment Statistics series for a state's unemployment rate.
pub fn series_id(fips: &str) -> String {
    format!("LASST{fips}0000000000003")
}

fn fips_of_series(series_id: &str) -> Option<&str> {
    series_id.get(5..7)
}

/// Newest observation and the one for the same period a year before it.
/// BLS lists observations newest first.
fn latest_with_prior(data: &[BlsObservation]) -> Option<(&BlsObservation, Option<&BlsObservation>)> {
    let latest = data.first()?;
    let prior_year = latest.year.parse::<i32>().ok().map(|year| (year - 1).to_string());
    let prior = prior_year.and_then(|year| {
        data.iter()
            .find(|obs| obs.year == year && obs.period == latest.period)
    });
    Some((latest, prior))
}

fn parse_state_series(series: &BlsSeries) -> Option<(&'static str, Unemployment)> {
    let info = states::by_fips(fips_of_series(&series.series_id)?)?;
    let (latest, prior) = latest_with_prior(&series.data)?;
    let value = latest.value.trim().parse::<f64>().ok()?;

    Some((
        info.abbr,
        Unemployment {
            value,
            previous: prior.and_then(|obs| obs.value.trim().parse().ok()),
            date: format!("{}-{}", latest.year, latest.period.trim_start_matches('M')),
        },
    ))
}

fn parse_youth_series(series: &BlsSeries) -> Option<YouthUnemployment> {
    let (latest, prior) = latest_with_prior(&series.data)?;
    let value: f64 = latest.value.trim().parse().ok()?;
    let change = prior
        .and_then(|obs| obs.value.trim().parse::<f64>().ok())
        .map(|previous| ((value - previous) * 10.0).round() / 10.0)
        .unwrap_or(0.0);

    Some(YouthUnemployment {
        value,
        change,
        date: format!("{} {}", latest.period_name, latest.year),
    })
}

async fn request_series(
    client: &Client,
    series: &[String],
    end_year: i32,
    policy: &RetryPolicy,
) -> Result<Vec<BlsSeries>, FetchError> {
    let body = SeriesRequest {
        seriesid: series,
        startyear: (end_year - 1).to_string(),
        endyear: end_year.to_string(),
    };

    let response: BlsResponse = send_json(|| client.post(BLS_URL).json(&body), policy).await?;
    if response.status != "REQUEST_SUCCEEDED" {
        return Err(FetchError::Unexpected {
            url: BLS_URL.to_string(),
            reason: response.status,
        });
    }

    Ok(response.results.map(|results| results.series).unwrap_or_default())
}

/// State unemployment rates for every state BLS answered for.
pub async fn fetch_unemployment(
    client: &Client,
    end_year: i32,
    policy: &RetryPolicy,
) -> Option<BTreeMap<String, Unemployment>> {
    info!("fetching unemployment data from BLS");
    let series_ids: Vec<String> = states::STATES.iter().map(|info| series_id(info.fips)).collect();
    let mut results = BTreeMap::new();

    for (index, batch) in series_ids.chunks(BATCH_SIZE).enumerate() {
        if index > 0 {
            pause(BATCH_DELAY).await;
        }

        match request_series(client, batch, end_year, policy).await {
            Ok(series) => {
                for entry in series.iter() {
                    if let Some((abbr, unemployment)) = parse_state_series(entry) {
                        results.insert(abbr.to_string(), unemployment);
                    }
                }
            }
            Err(err) => warn!(batch = index, "BLS batch failed: {err}"),
        }
    }

    info!(states = results.len(), "retrieved unemployment data");
    if results.is_empty() {
        None
    } else {
        Some(results)
    }
}

/// National youth (20-24) unemployment rate used by the young-adult dataset.
pub async fn fetch_youth_unemployment(
    client: &Client,
    end_year: i32,
    policy: &RetryPolicy,
) -> Option<YouthUnemployment> {
    let series = [YOUTH_UNEMPLOYMENT_SERIES.to_string()];
    match request_series(client, &series, end_year, policy).await {
        Ok(series) => series.first().and_then(parse_youth_series),
        Err(err) => {
            warn!("failed to fetch youth unemployment series: {err}");
            None
        }
    }
}
