//! Young Adult Affordability Index: a weighted z-score composite over the
//! curated young-adult dataset, scaled to 0-100 (lower is more affordable).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Map};

use crate::calculator::{round_to, Bounds};
use crate::models::{Dataset, IndicatorMeta, IndicatorValue, StateRecord, Thresholds};
use crate::national;
use crate::ranking::{self, RankOrder};

pub const YAAI_KEY: &str = "yaai";
pub const DATASET_VERSION: &str = "3.2";

const BOUNDS: Bounds = Bounds::new(0.0, 100.0);
const CENTER: f64 = 50.0;
const SCALE: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weight {
    pub key: &'static str,
    pub weight: f64,
    /// Income: a higher value is more affordable, so its z-score is flipped.
    pub higher_is_better: bool,
}

pub const WEIGHTS: [Weight; 5] = [
    Weight {
        key: "rent_burden",
        weight: 0.35,
        higher_is_better: false,
    },
    Weight {
        key: "student_debt",
        weight: 0.20,
        higher_is_better: false,
    },
    Weight {
        key: "debt_to_income",
        weight: 0.15,
        higher_is_better: false,
    },
    Weight {
        key: "cost_of_living",
        weight: 0.15,
        higher_is_better: false,
    },
    Weight {
        key: "median_income",
        weight: 0.15,
        higher_is_better: true,
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

pub fn stats(states: &BTreeMap<String, StateRecord>, key: &str) -> Option<Stats> {
    let values: Vec<f64> = states.values().filter_map(|state| state.value(key)).collect();
    if values.is_empty() {
        return None;
    }

    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / count;
    Some(Stats {
        mean,
        std_dev: variance.sqrt(),
    })
}

/// `None` when the indicator does not vary across states.
pub fn z_score(value: f64, stats: &Stats) -> Option<f64> {
    (stats.std_dev != 0.0).then(|| (value - stats.mean) / stats.std_dev)
}

/// YAAI per state code. States without a single usable indicator are left
/// out.
pub fn compute_scores(states: &BTreeMap<String, StateRecord>) -> BTreeMap<String, f64> {
    let all_stats: Vec<(Weight, Option<Stats>)> = WEIGHTS
        .iter()
        .map(|weight| (*weight, stats(states, weight.key)))
        .collect();

    states
        .iter()
        .filter_map(|(code, state)| {
            let mut weighted = 0.0;
            let mut used_weight = 0.0;

            for (weight, stats) in all_stats.iter() {
                let Some(stats) = stats else { continue };
                let Some(value) = state.value(weight.key) else {
                    continue;
                };
                let Some(mut z) = z_score(value, stats) else {
                    continue;
                };
                if weight.higher_is_better {
                    z = -z;
                }
                weighted += z * weight.weight;
                used_weight += weight.weight;
            }

            if used_weight == 0.0 {
                return None;
            }
            let raw = weighted / used_weight;
            let score = round_to(BOUNDS.clamp(CENTER + raw * SCALE), 1);
            Some((code.clone(), score))
        })
        .collect()
}

pub fn indicator_meta() -> IndicatorMeta {
    IndicatorMeta {
        name: "YAAI".to_string(),
        full_name: "Young Adult Affordability Index".to_string(),
        description: "Weighted composite: Rent Burden (35%), Student Debt (20%), D/I Ratio (15%), \
                      Cost of Living (15%), Income (15%). Lower scores = more affordable."
            .to_string(),
        source: "FinMango Research - Z-score normalized".to_string(),
        source_url: Some("https://finmango.org/affordability-lab".to_string()),
        unit: "score".to_string(),
        format: "index".to_string(),
        higher_is_bad: true,
        thresholds: Thresholds {
            low: 35.0,
            moderate: 50.0,
            elevated: 65.0,
            high: 80.0,
        },
        extra: Map::new(),
    }
}

/// Scores, ranks and aggregates the YAAI into the dataset in place, and
/// stamps the dataset metadata. Returns the number of states scored.
pub fn apply(dataset: &mut Dataset, now: DateTime<Utc>) -> usize {
    let scores = compute_scores(&dataset.states);

    for (code, state) in dataset.states.iter_mut() {
        match scores.get(code) {
            Some(score) => {
                state
                    .indicators
                    .insert(YAAI_KEY.to_string(), IndicatorValue::new(*score, Some(0.0)));
            }
            None => {
                state.indicators.remove(YAAI_KEY);
            }
        }
    }
    ranking::rank(&mut dataset.states, YAAI_KEY, RankOrder::LowestFirst);

    if let Some(mut aggregate) = national::aggregate(&dataset.states, YAAI_KEY) {
        aggregate.value = round_to(aggregate.value, 1);
        aggregate.extra.insert("label".into(), json!("Young Adult Affordability Index"));
        aggregate.extra.insert("unit".into(), json!("score"));
        aggregate.extra.insert(
            "source_note".into(),
            json!("FinMango weighted composite (lower = more affordable)"),
        );
        dataset.national.insert(YAAI_KEY.to_string(), aggregate);
    }

    dataset.indicators.insert(YAAI_KEY.to_string(), indicator_meta());
    dataset.meta.version = DATASET_VERSION.to_string();
    dataset.meta.generated = now;
    dataset.meta.data_sources.insert(
        YAAI_KEY.to_string(),
        "FinMango Research - Weighted z-score composite".to_string(),
    );

    scores.len()
}

/// States ordered from most to least affordable.
pub fn affordability_order(dataset: &Dataset) -> Vec<(&StateRecord, f64)> {
    let mut ordered: Vec<(&StateRecord, u32, f64)> = dataset
        .states
        .values()
        .filter_map(|state| {
            let reading = state.indicators.get(YAAI_KEY)?;
            Some((state, reading.rank?, reading.value?))
        })
        .collect();
    ordered.sort_by_key(|(_, rank, _)| *rank);
    ordered.into_iter().map(|(state, _, score)| (state, score)).collect()
}
