use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::StateRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    /// Highest value ranks 1 (Barometer, search-trends index).
    WorstFirst,
    /// Lowest value ranks 1 (YAAI: most affordable first).
    LowestFirst,
}

/// Assigns `rank` 1..N for one indicator over the states that have a value.
/// Equal values rank alphabetically by state code; states without a value
/// lose any rank they carried.
pub fn rank(states: &mut BTreeMap<String, StateRecord>, key: &str, order: RankOrder) {
    // BTreeMap iteration is already in state-code order, and the sort is stable.
    let mut ranked: Vec<(String, f64)> = states
        .iter()
        .filter_map(|(code, state)| state.value(key).map(|value| (code.clone(), value)))
        .collect();

    ranked.sort_by(|a, b| {
        let ordering = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        match order {
            RankOrder::WorstFirst => ordering.reverse(),
            RankOrder::LowestFirst => ordering,
        }
    });

    for state in states.values_mut() {
        if let Some(reading) = state.indicators.get_mut(key) {
            reading.rank = None;
        }
    }

    for (position, (code, _)) in ranked.iter().enumerate() {
        if let Some(reading) = states.get_mut(code).and_then(|state| state.indicators.get_mut(key)) {
            reading.rank = Some(position as u32 + 1);
        }
    }
}
