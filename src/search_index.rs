//! Search-trends variant of the Barometer: each indicator is the weighted
//! average interest (0-100) over its catalog of search terms.

use std::collections::BTreeMap;

use crate::calculator::round_to;
use crate::models::{Dataset, Indicator, IndicatorValue, StateRecord};
use crate::states;

/// `region -> indicator key -> term -> latest interest`. A `None` term is one
/// whose fetch failed; it counts as zero interest.
pub type RawTrends = BTreeMap<String, BTreeMap<String, BTreeMap<String, Option<f64>>>>;

pub const INDEX_MIN: f64 = 0.0;
pub const INDEX_MAX: f64 = 100.0;

const FINANCIAL_ANXIETY_TERMS: [(&str, f64); 11] = [
    ("debt help", 1.0),
    ("bankruptcy", 1.5),
    ("payday loan", 1.2),
    ("can't pay rent", 1.8),
    ("debt relief", 1.0),
    ("debt collector", 1.3),
    ("credit card debt", 1.5),
    ("student loan forgiveness", 1.2),
    ("borrow money", 1.6),
    ("pawn shop", 1.8),
    ("overdraft fees", 1.4),
];

const FOOD_INSECURITY_TERMS: [(&str, f64); 10] = [
    ("food stamps", 1.0),
    ("food bank near me", 1.4),
    ("SNAP benefits", 1.0),
    ("free food", 1.3),
    ("food pantry", 1.2),
    ("EBT balance", 0.8),
    ("apply for food stamps", 1.8),
    ("WIC program", 1.0),
    ("cheap meals", 1.0),
    ("grocery assistance", 1.5),
];

const HOUSING_STRESS_TERMS: [(&str, f64); 10] = [
    ("eviction help", 1.8),
    ("rent assistance", 1.2),
    ("housing assistance", 1.0),
    ("facing eviction", 2.0),
    ("tenant rights", 1.0),
    ("behind on rent", 1.5),
    ("homeless shelter", 2.0),
    ("emergency housing", 1.9),
    ("section 8 application", 1.4),
    ("unable to pay rent", 1.9),
];

const AFFORDABILITY_TERMS: [(&str, f64); 10] = [
    ("cost of living", 1.0),
    ("prices too high", 1.3),
    ("can't afford", 1.5),
    ("inflation help", 1.2),
    ("cheap groceries", 0.8),
    ("budget tips", 0.7),
    ("gas prices", 1.0),
    ("utility bill help", 1.5),
    ("electricity bill assistance", 1.5),
    ("save money on groceries", 1.1),
];

/// Search terms and their weights for one indicator. The first term is the
/// one the Barometer's trend sample queries.
pub fn terms(indicator: Indicator) -> &'static [(&'static str, f64)] {
    match indicator {
        Indicator::FinancialAnxiety => &FINANCIAL_ANXIETY_TERMS,
        Indicator::FoodInsecurity => &FOOD_INSECURITY_TERMS,
        Indicator::HousingStress => &HOUSING_STRESS_TERMS,
        Indicator::Affordability => &AFFORDABILITY_TERMS,
    }
}

pub fn weighted_index(values: Option<&BTreeMap<String, Option<f64>>>, weights: &[(&str, f64)]) -> f64 {
    let mut sum = 0.0;
    let mut total_weight = 0.0;
    for (term, weight) in weights {
        let value = values
            .and_then(|values| values.get(*term).copied().flatten())
            .unwrap_or(0.0);
        sum += value * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        sum / total_weight
    } else {
        0.0
    }
}

/// Percent change against the previous run; zero without a usable baseline.
pub fn calculate_change(current: f64, previous: Option<f64>) -> f64 {
    match previous {
        Some(previous) if previous != 0.0 => (current - previous) / previous * 100.0,
        _ => 0.0,
    }
}

/// State records for every region in the raw file. `previous` is the last
/// published dataset, used as the baseline for `change`.
pub fn build_states(raw: &RawTrends, previous: Option<&Dataset>) -> BTreeMap<String, StateRecord> {
    raw.iter()
        .map(|(region, by_indicator)| {
            let abbr = states::abbr_of(region);
            let name = states::by_abbr(abbr).map_or(region.as_str(), |info| info.name);
            let mut record = StateRecord::new(name, abbr);

            for indicator in Indicator::ALL {
                let index = weighted_index(by_indicator.get(indicator.key()), terms(indicator))
                    .clamp(INDEX_MIN, INDEX_MAX);
                let value = round_to(index, 1);
                let baseline = previous.and_then(|dataset| dataset.value(region, indicator.key()));
                let change = round_to(calculate_change(value, baseline), 1);
                record
                    .indicators
                    .insert(indicator.key().to_string(), IndicatorValue::new(value, Some(change)));
            }

            (region.clone(), record)
        })
        .collect()
}
