//! End-to-end runs behind each CLI subcommand. The `build_*` functions are
//! pure over their inputs; the `run_*` functions add fetching and file I/O.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map};
use tracing::{debug, info, warn};

use crate::calculator::{self, Tables};
use crate::config::{ApiKeys, DataPaths, GOOGLE_TRENDS_API_KEY};
use crate::fetch::http::{self, RetryPolicy};
use crate::fetch::trends::{self, BulkOptions, BulkOutcome};
use crate::fetch::{self, bls, FetchOptions, SourceData};
use crate::filler;
use crate::models::{Dataset, Indicator, Meta, TimeseriesPoint, Trend};
use crate::national;
use crate::output::{self, ScriptWrapper};
use crate::ranking::{self, RankOrder};
use crate::reference::{self, ReferenceData};
use crate::search_index::{self, RawTrends};
use crate::yaai;

const BAROMETER_VERSION: &str = "2.2";
const BAROMETER_SOURCE: &str = "BLS, FRED, Census Bureau, HUD, Google Trends APIs";
const TRENDS_INDEX_VERSION: &str = "1.0";
const TRENDS_INDEX_SOURCE: &str = "Google Health Trends API";
const TIMESERIES_SCOPE: &str = "national";

pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn barometer_keys() -> Vec<&'static str> {
    Indicator::ALL.iter().map(|indicator| indicator.key()).collect()
}

/// Calculate, fill, rank, aggregate.
pub fn build_barometer<R: Rng + ?Sized>(
    sources: &SourceData,
    reference: Option<&ReferenceData>,
    tables: &Tables,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Dataset {
    let mut states = calculator::calculate(sources, reference, tables);
    let estimated = filler::fill_gaps(&mut states, tables, rng);
    if estimated > 0 {
        info!(estimated, "estimated missing values");
    }

    for indicator in Indicator::ALL {
        ranking::rank(&mut states, indicator.key(), RankOrder::WorstFirst);
    }

    let national = national::aggregate_all(&states, &barometer_keys());
    let timeseries = BTreeMap::from([(
        TIMESERIES_SCOPE.to_string(),
        national::timeseries(&national, now.date_naive(), rng),
    )]);

    let mut data_sources = sources.provenance();
    if let Some(reference) = reference {
        let label = match (&reference.source, reference.year) {
            (Some(source), Some(year)) => format!("{source} ({year})"),
            (Some(source), None) => source.clone(),
            _ => "reference file".to_string(),
        };
        data_sources.insert("reference".to_string(), label);
    }

    Dataset {
        meta: Meta {
            generated: now,
            version: BAROMETER_VERSION.to_string(),
            source: BAROMETER_SOURCE.to_string(),
            update_frequency: "daily".to_string(),
            data_sources,
            extra: Map::new(),
        },
        national,
        states,
        timeseries,
        indicators: BTreeMap::new(),
    }
}

#[derive(Debug, Clone)]
pub struct BarometerOptions {
    pub paths: DataPaths,
    /// Overrides the reference file under the data directory.
    pub reference: Option<PathBuf>,
    pub seed: Option<u64>,
    pub skip_trends: bool,
}

pub async fn run_barometer(options: &BarometerOptions) -> Result<Dataset> {
    let keys = ApiKeys::from_env();
    let client = http::build_client()?;
    let now = Utc::now();

    let fetch_options = FetchOptions {
        today: now.date_naive(),
        include_trends: !options.skip_trends,
        policy: RetryPolicy::default(),
    };
    let sources = fetch::fetch_all(&client, &keys, &fetch_options).await;

    let reference_path = options
        .reference
        .clone()
        .unwrap_or_else(|| options.paths.reference());
    let reference = reference::load_reference(&reference_path);

    let mut rng = make_rng(options.seed);
    let dataset = build_barometer(&sources, reference.as_ref(), &Tables::standard(), now, &mut rng);

    output::write_dataset(
        &dataset,
        &options.paths.latest_json(),
        &options.paths.dashboard_script(),
        ScriptWrapper::Dashboard,
    )?;
    info!(path = %options.paths.latest_json().display(), "wrote barometer dataset");
    Ok(dataset)
}

/// Replaces the national youth unemployment reading with a fresh BLS figure.
fn apply_youth_unemployment(dataset: &mut Dataset, youth: &bls::YouthUnemployment) {
    let Some(national) = dataset.national.get_mut("unemployment") else {
        warn!("dataset has no national unemployment entry to refresh");
        return;
    };

    national.value = youth.value;
    national.change = youth.change;
    national.trend = Trend::from_change(youth.change);
    national
        .extra
        .insert("source_note".into(), json!(format!("BLS (Ages 20-24) {}", youth.date)));
}

pub async fn run_yaai(input: &Path, paths: &DataPaths, refresh_unemployment: bool) -> Result<Dataset> {
    let mut dataset = output::read_dataset(input)
        .with_context(|| format!("failed to load young adult dataset {}", input.display()))?;

    if refresh_unemployment {
        let client = http::build_client()?;
        let year = Utc::now().year();
        match bls::fetch_youth_unemployment(&client, year, &RetryPolicy::default()).await {
            Some(youth) => {
                info!(value = youth.value, date = youth.date.as_str(), "refreshed youth unemployment");
                apply_youth_unemployment(&mut dataset, &youth);
            }
            None => warn!("keeping existing youth unemployment figure"),
        }
    }

    let scored = yaai::apply(&mut dataset, Utc::now());
    info!(states = scored, "calculated YAAI");

    output::write_dataset(
        &dataset,
        &paths.young_adult_json(),
        &paths.student_map_script(),
        ScriptWrapper::YoungAdult,
    )?;
    Ok(dataset)
}

/// Crawls every search term for every state and writes the raw daily file,
/// partial or not.
pub async fn run_fetch_trends(paths: &DataPaths, today: NaiveDate) -> Result<(BulkOutcome, PathBuf)> {
    let keys = ApiKeys::from_env();
    let Some(api_key) = keys.google_trends.as_deref() else {
        bail!("{GOOGLE_TRENDS_API_KEY} must be set to fetch search trends");
    };

    let client = http::build_client()?;
    let outcome = trends::fetch_bulk(&client, api_key, today, &BulkOptions::default()).await;

    let path = paths.raw_trends(today);
    let json = serde_json::to_string_pretty(&outcome.raw).context("failed to serialize raw trends")?;
    output::write_atomic(&path, json.as_bytes())?;
    info!(
        path = %path.display(),
        requests = outcome.requests,
        failures = outcome.failures,
        "saved raw trends"
    );
    Ok((outcome, path))
}

/// Search-trends index over a raw daily file. `previous` is the last
/// published dataset and only serves as the change baseline when it came
/// from this same index.
pub fn build_trends_index(raw: &RawTrends, previous: Option<&Dataset>, now: DateTime<Utc>) -> Dataset {
    let previous = previous.filter(|dataset| dataset.meta.source == TRENDS_INDEX_SOURCE);
    if previous.is_none() {
        debug!("no previous trends index, changes start at zero");
    }

    let mut states = search_index::build_states(raw, previous);
    for indicator in Indicator::ALL {
        ranking::rank(&mut states, indicator.key(), RankOrder::WorstFirst);
    }

    let national = national::aggregate_all(&states, &barometer_keys());
    let today = now.date_naive();
    let series = national
        .iter()
        .map(|(key, aggregate)| {
            (
                key.clone(),
                vec![TimeseriesPoint {
                    date: today,
                    value: aggregate.value,
                }],
            )
        })
        .collect();

    Dataset {
        meta: Meta {
            generated: now,
            version: TRENDS_INDEX_VERSION.to_string(),
            source: TRENDS_INDEX_SOURCE.to_string(),
            update_frequency: "daily".to_string(),
            data_sources: BTreeMap::new(),
            extra: Map::new(),
        },
        national,
        states,
        timeseries: BTreeMap::from([(TIMESERIES_SCOPE.to_string(), series)]),
        indicators: BTreeMap::new(),
    }
}

pub fn run_trends_index(paths: &DataPaths, date: NaiveDate) -> Result<Dataset> {
    let raw_path = paths.raw_trends(date);
    if !raw_path.exists() {
        bail!("raw trends file not found: {}", raw_path.display());
    }

    let raw_text = std::fs::read_to_string(&raw_path)
        .with_context(|| format!("failed to read {}", raw_path.display()))?;
    let raw: RawTrends = serde_json::from_str(&raw_text)
        .with_context(|| format!("failed to parse {}", raw_path.display()))?;

    let previous = match output::read_dataset(&paths.latest_json()) {
        Ok(dataset) => Some(dataset),
        Err(err) => {
            debug!("no previous dataset: {err:#}");
            None
        }
    };

    let dataset = build_trends_index(&raw, previous.as_ref(), Utc::now());
    output::write_dataset(
        &dataset,
        &paths.latest_json(),
        &paths.dashboard_script(),
        ScriptWrapper::Dashboard,
    )?;
    info!(states = dataset.states.len(), "wrote search trends index");
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{HousingPrice, Poverty, Unemployment};
    use crate::states;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap()
    }

    fn partial_sources() -> SourceData {
        let unemployment = states::STATES
            .iter()
            .take(30)
            .enumerate()
            .map(|(index, info)| {
                (
                    info.abbr.to_string(),
                    Unemployment {
                        value: 3.0 + index as f64 * 0.1,
                        previous: Some(3.5),
                        date: "2026-01".to_string(),
                    },
                )
            })
            .collect();
        let poverty = states::STATES
            .iter()
            .skip(20)
            .map(|info| {
                (
                    info.abbr.to_string(),
                    Poverty {
                        poverty_rate: 12.5,
                        child_poverty_rate: Some(16.0),
                        year: 2024,
                    },
                )
            })
            .collect();
        let housing = BTreeMap::from([(
            "CA".to_string(),
            HousingPrice {
                value: 450.0,
                previous: Some(430.0),
                change: Some(4.65),
                date: "2025-10-01".to_string(),
            },
        )]);

        SourceData {
            unemployment: Some(unemployment),
            poverty: Some(poverty),
            housing: Some(housing),
            ..SourceData::default()
        }
    }

    #[test]
    fn barometer_is_complete_ranked_and_aggregated() {
        let tables = Tables::standard();
        let mut rng = make_rng(Some(9));
        let dataset = build_barometer(&partial_sources(), None, &tables, now(), &mut rng);

        assert_eq!(dataset.states.len(), 51);
        for indicator in Indicator::ALL {
            let key = indicator.key();
            let bounds = tables.bounds(indicator).unwrap();

            let mut ranks: Vec<u32> = dataset
                .states
                .values()
                .map(|state| {
                    let reading = &state.indicators[key];
                    assert!(bounds.contains(reading.value.unwrap()));
                    reading.rank.unwrap()
                })
                .collect();
            ranks.sort_unstable();
            assert_eq!(ranks, (1..=51).collect::<Vec<u32>>());

            let mean = dataset.states.values().filter_map(|state| state.value(key)).sum::<f64>() / 51.0;
            assert!((dataset.national[key].value - mean).abs() < 1e-6);
            assert_eq!(dataset.timeseries["national"][key].len(), 6);
        }

        assert_eq!(dataset.meta.data_sources["unemployment"], "BLS LAUS");
        assert_eq!(dataset.meta.data_sources["rent"], "reference");
        assert_eq!(dataset.meta.generated, now());
    }

    #[test]
    fn same_seed_same_dataset() {
        let tables = Tables::standard();
        let first = build_barometer(&partial_sources(), None, &tables, now(), &mut make_rng(Some(5)));
        let second = build_barometer(&partial_sources(), None, &tables, now(), &mut make_rng(Some(5)));
        assert_eq!(
            output::to_json(&first).unwrap(),
            output::to_json(&second).unwrap()
        );
    }

    fn raw_file() -> RawTrends {
        let mut raw = RawTrends::new();
        for (region, interest) in [("US-CA", 60.0), ("US-MS", 80.0), ("US-VT", 20.0)] {
            let by_indicator = raw.entry(region.to_string()).or_default();
            for indicator in Indicator::ALL {
                let terms = search_index::terms(indicator)
                    .iter()
                    .map(|(term, _)| (term.to_string(), Some(interest)))
                    .collect();
                by_indicator.insert(indicator.key().to_string(), terms);
            }
        }
        raw
    }

    #[test]
    fn trends_index_ranks_highest_interest_first() {
        let dataset = build_trends_index(&raw_file(), None, now());

        let housing = |code: &str| dataset.states[code].indicators["housing_stress"].clone();
        assert_eq!(housing("US-MS").value, Some(80.0));
        assert_eq!(housing("US-MS").rank, Some(1));
        assert_eq!(housing("US-VT").rank, Some(3));
        assert_eq!(housing("US-CA").change, Some(0.0));

        let national = &dataset.national["housing_stress"];
        assert!((national.value - 160.0 / 3.0).abs() < 1e-6);
        let series = &dataset.timeseries["national"]["housing_stress"];
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].date, now().date_naive());
        assert_eq!(dataset.meta.source, TRENDS_INDEX_SOURCE);
    }

    #[test]
    fn trends_index_ignores_barometer_as_baseline() {
        let barometer = build_barometer(
            &partial_sources(),
            None,
            &Tables::standard(),
            now(),
            &mut make_rng(Some(1)),
        );
        let fresh = build_trends_index(&raw_file(), Some(&barometer), now());
        assert_eq!(fresh.states["US-CA"].indicators["affordability"].change, Some(0.0));

        let mut previous = fresh.clone();
        previous
            .states
            .get_mut("US-CA")
            .unwrap()
            .indicators
            .get_mut("affordability")
            .unwrap()
            .value = Some(50.0);
        let next = build_trends_index(&raw_file(), Some(&previous), now());
        assert_eq!(next.states["US-CA"].indicators["affordability"].change, Some(20.0));
    }

    #[test]
    fn missing_raw_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let err = run_trends_index(&paths, date).unwrap_err();
        assert!(err.to_string().contains("raw trends file not found"));
        assert!(!paths.latest_json().exists());
    }

    #[test]
    fn trends_index_writes_both_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let raw = serde_json::to_string(&raw_file()).unwrap();
        output::write_atomic(&paths.raw_trends(date), raw.as_bytes()).unwrap();

        let dataset = run_trends_index(&paths, date).unwrap();
        assert_eq!(dataset.states.len(), 3);
        let script = output::read_dataset(&paths.dashboard_script()).unwrap();
        assert_eq!(script.states, dataset.states);
    }

    #[test]
    fn youth_unemployment_refresh_updates_national_entry() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/young-adult-data.json");
        let mut dataset = output::read_dataset(&path).unwrap();
        let youth = bls::YouthUnemployment {
            value: 8.4,
            change: -0.3,
            date: "February 2026".to_string(),
        };

        apply_youth_unemployment(&mut dataset, &youth);
        let national = &dataset.national["unemployment"];
        assert_eq!(national.value, 8.4);
        assert_eq!(national.trend, Trend::Down);
        assert_eq!(national.extra["source_note"], json!("BLS (Ages 20-24) February 2026"));
        assert_eq!(national.extra["label"], json!("Youth Unemployment Rate"));
    }

    #[tokio::test]
    async fn yaai_run_writes_young_adult_outputs() {
        let source = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/young-adult-data.json");
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());

        let dataset = run_yaai(&source, &paths, false).await.unwrap();
        assert_eq!(dataset.meta.version, "3.2");
        assert!(dataset.national.contains_key("yaai"));

        let script = std::fs::read_to_string(paths.student_map_script()).unwrap();
        assert!(script.contains("const YOUNG_ADULT_DATA = {"));
        let written = output::read_dataset(&paths.young_adult_json()).unwrap();
        assert_eq!(written.states.len(), 51);
        assert!(written.value("US-AL", "yaai").is_some());
    }
}
