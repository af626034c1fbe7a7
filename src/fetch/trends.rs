//! Search-interest graphs from the Google Trends v1beta API.
//!
//! Two access patterns: a small sample used as an additive boost by the
//! Barometer calculator, and the bulk per-term crawl persisted as the raw
//! daily file the search-trends index is computed from.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::{Months, NaiveDate};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{error, info, warn};

use super::http::{pause, send_json, FetchError, RetryPolicy};
use crate::models::Indicator;
use crate::search_index::{self, RawTrends};
use crate::states;

const TRENDS_URL: &str = "https://www.googleapis.com/trends/v1beta/graph";
const LOOKBACK_MONTHS: u32 = 3;

const SAMPLE_STATES: [&str; 10] = ["CA", "TX", "FL", "NY", "MS", "LA", "WV", "NH", "ND", "IL"];
const SAMPLE_MAX_REQUESTS: usize = 20;
const SAMPLE_DELAY: Duration = Duration::from_millis(500);

/// Latest search interest (0-100) per indicator and state abbreviation.
pub type TrendBoosts = BTreeMap<Indicator, BTreeMap<String, f64>>;

#[derive(Debug, Deserialize)]
struct GraphResponse {
    #[serde(default)]
    lines: Vec<GraphLine>,
}

#[derive(Debug, Deserialize)]
struct GraphLine {
    #[serde(default)]
    points: Vec<GraphPoint>,
}

#[derive(Debug, Deserialize)]
struct GraphPoint {
    value: f64,
}

fn latest_point(response: &GraphResponse) -> Option<f64> {
    response
        .lines
        .first()
        .and_then(|line| line.points.last())
        .map(|point| point.value)
}

/// First month of the query window, `YYYY-MM`.
pub fn start_month(today: NaiveDate) -> String {
    today
        .checked_sub_months(Months::new(LOOKBACK_MONTHS))
        .unwrap_or(today)
        .format("%Y-%m")
        .to_string()
}

fn graph_request(client: &Client, api_key: &str, term: &str, region: &str, start: &str) -> RequestBuilder {
    client.get(TRENDS_URL).query(&[
        ("terms", term),
        ("restrictions.geo", region),
        ("restrictions.startDate", start),
        ("key", api_key),
    ])
}

async fn fetch_term(
    client: &Client,
    api_key: &str,
    term: &str,
    region: &str,
    start: &str,
    policy: &RetryPolicy,
) -> Result<f64, FetchError> {
    let response: GraphResponse = send_json(
        || graph_request(client, api_key, term, region, start),
        policy,
    )
    .await?;
    // An empty graph means no measurable interest.
    Ok(latest_point(&response).unwrap_or(0.0))
}

/// Sample of the first term per indicator over a fixed set of states, kept
/// under the API quota. Stops at the first rate-limited response.
pub async fn fetch_sample(client: &Client, api_key: Option<&str>, today: NaiveDate) -> Option<TrendBoosts> {
    let Some(api_key) = api_key else {
        warn!("GOOGLE_TRENDS_API_KEY not set - skipping trends data");
        return None;
    };

    info!("fetching search trends sample");
    let start = start_month(today);
    let single_attempt = RetryPolicy {
        attempts: 1,
        ..RetryPolicy::default()
    };
    let mut boosts = TrendBoosts::new();
    let mut requests = 0usize;

    'indicators: for indicator in Indicator::ALL {
        let Some((term, _)) = search_index::terms(indicator).first() else {
            continue;
        };

        for abbr in SAMPLE_STATES {
            if requests >= SAMPLE_MAX_REQUESTS {
                info!("trends request budget reached");
                break 'indicators;
            }

            let region = states::state_code(abbr);
            let result = fetch_term(client, api_key, term, &region, &start, &single_attempt).await;
            requests += 1;

            match result {
                Ok(value) => {
                    boosts.entry(indicator).or_default().insert(abbr.to_string(), value);
                }
                Err(err) if err.is_rate_limited() => {
                    warn!("rate limited, stopping trends fetch");
                    break 'indicators;
                }
                Err(err) => warn!(
                    indicator = indicator.key(),
                    region = region.as_str(),
                    "could not fetch trends: {err}"
                ),
            }

            pause(SAMPLE_DELAY).await;
        }
    }

    info!(requests, "retrieved trends sample");
    if boosts.is_empty() {
        None
    } else {
        Some(boosts)
    }
}

#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Wait before every request.
    pub throttle: Duration,
    /// Consecutive failed terms after which the crawl is abandoned.
    pub max_consecutive_failures: u32,
    pub policy: RetryPolicy,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(2000),
            max_consecutive_failures: 5,
            policy: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub raw: RawTrends,
    pub requests: usize,
    pub failures: usize,
    /// Set when the circuit breaker tripped; `raw` holds what was collected.
    pub aborted: bool,
}

/// Every term of every indicator for every state, serially.
pub async fn fetch_bulk(client: &Client, api_key: &str, today: NaiveDate, options: &BulkOptions) -> BulkOutcome {
    let start = start_month(today);
    let regions: Vec<String> = states::STATES.iter().map(|info| info.code()).collect();

    collect_terms(&regions, options, |region, term| {
        let start = start.clone();
        let policy = options.policy.clone();
        async move { fetch_term(client, api_key, &term, &region, &start, &policy).await }
    })
    .await
}

async fn collect_terms<F, Fut>(regions: &[String], options: &BulkOptions, mut fetch: F) -> BulkOutcome
where
    F: FnMut(String, String) -> Fut,
    Fut: Future<Output = Result<f64, FetchError>>,
{
    let mut outcome = BulkOutcome::default();
    let mut consecutive_failures = 0u32;

    'regions: for region in regions {
        info!(region = region.as_str(), "processing region");
        let by_indicator = outcome.raw.entry(region.clone()).or_default();

        for indicator in Indicator::ALL {
            let by_term = by_indicator.entry(indicator.key().to_string()).or_default();

            for (term, _) in search_index::terms(indicator) {
                if consecutive_failures >= options.max_consecutive_failures {
                    error!(
                        consecutive_failures,
                        "too many consecutive failures, aborting trends fetch"
                    );
                    outcome.aborted = true;
                    break 'regions;
                }

                pause(options.throttle).await;
                outcome.requests += 1;

                match fetch(region.clone(), term.to_string()).await {
                    Ok(value) => {
                        consecutive_failures = 0;
                        by_term.insert(term.to_string(), Some(value));
                    }
                    Err(err) => {
                        consecutive_failures += 1;
                        outcome.failures += 1;
                        warn!(region = region.as_str(), term = *term, "term fetch failed: {err}");
                        by_term.insert(term.to_string(), None);
                    }
                }
            }
        }
    }

    outcome
}
