//! Upstream statistics fetchers. Each one degrades to `None` or partial data
//! instead of failing the run.

pub mod bls;
pub mod census;
pub mod fred;
pub mod http;
pub mod hud;
pub mod trends;

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use tracing::info;

pub use bls::Unemployment;
pub use census::{AcsRent, Poverty};
pub use fred::HousingPrice;
pub use http::RetryPolicy;
pub use trends::TrendBoosts;

use crate::config::ApiKeys;

/// Everything the live fetchers returned for one run.
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub unemployment: Option<BTreeMap<String, Unemployment>>,
    pub housing: Option<BTreeMap<String, HousingPrice>>,
    pub poverty: Option<BTreeMap<String, Poverty>>,
    pub rent: Option<BTreeMap<String, AcsRent>>,
    pub fmr: Option<BTreeMap<String, f64>>,
    pub trends: Option<TrendBoosts>,
}

impl SourceData {
    /// Per-source provenance for the dataset's `meta.data_sources`.
    pub fn provenance(&self) -> BTreeMap<String, String> {
        let label = |present: bool, name: &str, missing: &str| {
            if present { name } else { missing }.to_string()
        };

        BTreeMap::from([
            (
                "unemployment".to_string(),
                label(self.unemployment.is_some(), "BLS LAUS", "estimated"),
            ),
            (
                "housing".to_string(),
                label(self.housing.is_some(), "FRED HPI", "estimated"),
            ),
            (
                "poverty".to_string(),
                label(self.poverty.is_some(), "Census SAIPE", "estimated"),
            ),
            (
                "rent".to_string(),
                label(self.rent.is_some(), "Census ACS", "reference"),
            ),
            (
                "fair_market_rent".to_string(),
                label(self.fmr.is_some(), "HUD FMR", "not used"),
            ),
            (
                "trends".to_string(),
                label(self.trends.is_some(), "Google Trends", "not used"),
            ),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub today: NaiveDate,
    pub include_trends: bool,
    pub policy: RetryPolicy,
}

/// Runs the statistics fetchers concurrently, then the trends sample on its
/// own so a quota problem there cannot slow the others down.
pub async fn fetch_all(client: &Client, keys: &ApiKeys, options: &FetchOptions) -> SourceData {
    let year = options.today.year();
    let policy = &options.policy;

    let (unemployment, housing, poverty, rent, fmr) = tokio::join!(
        bls::fetch_unemployment(client, year, policy),
        fred::fetch_housing_prices(client, keys.fred.as_deref(), policy),
        census::fetch_poverty(client, keys.census.as_deref(), year, policy),
        census::fetch_acs_rent(client, keys.census.as_deref(), year, policy),
        hud::fetch_fair_market_rents(client, keys.hud.as_deref(), policy),
    );

    let trends = if options.include_trends {
        trends::fetch_sample(client, keys.google_trends.as_deref(), options.today).await
    } else {
        info!("trends sample disabled");
        None
    };

    SourceData {
        unemployment,
        housing,
        poverty,
        rent,
        fmr,
        trends,
    }
}
