use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use rand::Rng;
use serde_json::Map;

use crate::models::{NationalAggregate, StateRecord, TimeseriesPoint, Trend};

const TIMESERIES_MONTHS: u32 = 6;
/// Each month back sits this much lower than the current value.
const MONTHLY_DECAY: f64 = 0.03;
const JITTER: f64 = 0.02;

/// Unweighted mean over the states that have a value. A state's missing
/// change counts as zero.
pub fn aggregate(states: &BTreeMap<String, StateRecord>, key: &str) -> Option<NationalAggregate> {
    let readings: Vec<(f64, f64)> = states
        .values()
        .filter_map(|state| state.indicators.get(key))
        .filter_map(|reading| reading.value.map(|value| (value, reading.change.unwrap_or(0.0))))
        .collect();

    if readings.is_empty() {
        return None;
    }

    let count = readings.len() as f64;
    let value = readings.iter().map(|(value, _)| value).sum::<f64>() / count;
    let change = readings.iter().map(|(_, change)| change).sum::<f64>() / count;

    Some(NationalAggregate {
        value,
        change,
        trend: Trend::from_change(change),
        extra: Map::new(),
    })
}

pub fn aggregate_all(states: &BTreeMap<String, StateRecord>, keys: &[&str]) -> BTreeMap<String, NationalAggregate> {
    keys.iter()
        .filter_map(|key| aggregate(states, key).map(|national| (key.to_string(), national)))
        .collect()
}

/// Six monthly points per indicator ending with the current month, trending
/// up toward today's national value.
pub fn timeseries<R: Rng + ?Sized>(
    national: &BTreeMap<String, NationalAggregate>,
    today: NaiveDate,
    rng: &mut R,
) -> BTreeMap<String, Vec<TimeseriesPoint>> {
    let month_start = today.with_day(1).unwrap_or(today);

    national
        .iter()
        .map(|(key, aggregate)| {
            let points = (0..TIMESERIES_MONTHS)
                .rev()
                .map(|months_back| {
                    let variation = 1.0 - f64::from(months_back) * MONTHLY_DECAY + rng.random_range(0.0..JITTER);
                    TimeseriesPoint {
                        date: month_start
                            .checked_sub_months(Months::new(months_back))
                            .unwrap_or(month_start),
                        value: (aggregate.value * variation).round(),
                    }
                })
                .collect();
            (key.clone(), points)
        })
        .collect()
}
