//! HUD Fair Market Rents, one request per state.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use super::http::{pause, send_json, RetryPolicy};
use crate::states;

const HUD_URL: &str = "https://www.huduser.gov/hudapi/public/fmr/statedata";
const REQUEST_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Deserialize)]
struct HudResponse {
    data: HudStateData,
}

#[derive(Debug, Default, Deserialize)]
struct HudStateData {
    #[serde(default)]
    counties: Vec<HudArea>,
    #[serde(default)]
    metroareas: Vec<HudArea>,
}

#[derive(Debug, Deserialize)]
struct HudArea {
    #[serde(rename = "Two-Bedroom", default)]
    two_bedroom: Option<f64>,
}

fn mean_two_bedroom(areas: &[HudArea]) -> Option<f64> {
    let values: Vec<f64> = areas.iter().filter_map(|area| area.two_bedroom).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// State-level two-bedroom FMR: the county mean, or the metro-area mean when
/// HUD lists no counties.
fn state_fmr(data: &HudStateData) -> Option<f64> {
    mean_two_bedroom(&data.counties).or_else(|| mean_two_bedroom(&data.metroareas))
}

pub async fn fetch_fair_market_rents(
    client: &Client,
    api_key: Option<&str>,
    policy: &RetryPolicy,
) -> Option<BTreeMap<String, f64>> {
    let Some(api_key) = api_key else {
        warn!("HUD_API_KEY not set - skipping fair market rent data");
        return None;
    };

    info!("fetching fair market rents from HUD");
    let mut results = BTreeMap::new();

    for (index, info) in states::STATES.iter().enumerate() {
        if index > 0 {
            pause(REQUEST_DELAY).await;
        }

        let url = format!("{HUD_URL}/{}", info.abbr);
        let response =
            send_json::<HudResponse, _>(|| client.get(&url).bearer_auth(api_key), policy).await;

        match response {
            Ok(body) => {
                if let Some(fmr) = state_fmr(&body.data) {
                    results.insert(info.abbr.to_string(), fmr);
                }
            }
            Err(err) => warn!(state = info.abbr, "could not fetch fair market rent: {err}"),
        }
    }

    info!(states = results.len(), "retrieved fair market rents");
    if results.is_empty() {
        None
    } else {
        Some(results)
    }
}
