use std::fmt::Write;

use crate::models::{Dataset, Indicator, NationalAggregate, StateRecord};
use crate::yaai;

fn national_line(label: &str, national: &NationalAggregate) -> String {
    format!(
        "{}: {:.1} ({:+.1}%, {})",
        label,
        national.value,
        national.change,
        national.trend.as_str()
    )
}

/// One line per Barometer indicator present in the dataset.
pub fn national_summary(dataset: &Dataset) -> Vec<String> {
    Indicator::ALL
        .iter()
        .filter_map(|indicator| {
            dataset
                .national
                .get(indicator.key())
                .map(|national| national_line(indicator.label(), national))
        })
        .collect()
}

/// States holding ranks 1..=limit for an indicator.
pub fn top_states<'a>(dataset: &'a Dataset, key: &str, limit: usize) -> Vec<(&'a StateRecord, f64, u32)> {
    let mut ranked: Vec<(&StateRecord, f64, u32)> = dataset
        .states
        .values()
        .filter_map(|state| {
            let reading = state.indicators.get(key)?;
            Some((state, reading.value?, reading.rank?))
        })
        .collect();
    ranked.sort_by_key(|(_, _, rank)| *rank);
    ranked.truncate(limit);
    ranked
}

pub fn build_report(dataset: &Dataset, top: usize) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Financial Health Barometer Report");
    let _ = writeln!(
        output,
        "Generated {} from {} (version {})",
        dataset.meta.generated.format("%Y-%m-%d %H:%M UTC"),
        dataset.meta.source,
        dataset.meta.version
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## National Summary");

    let summary = national_summary(dataset);
    if summary.is_empty() {
        let _ = writeln!(output, "No national aggregates in this dataset.");
    } else {
        for line in summary.iter() {
            let _ = writeln!(output, "- {line}");
        }
    }

    for indicator in Indicator::ALL {
        let states = top_states(dataset, indicator.key(), top);
        if states.is_empty() {
            continue;
        }

        let _ = writeln!(output);
        let _ = writeln!(output, "## Highest {}", indicator.label());
        for (state, value, rank) in states.iter() {
            let change = state.indicators[indicator.key()]
                .change
                .map(|change| format!(" ({change:+.1}%)"))
                .unwrap_or_default();
            let _ = writeln!(output, "{}. {} ({}): {:.0}{}", rank, state.name, state.abbr, value, change);
        }
    }

    let estimated: Vec<(&StateRecord, &Vec<String>)> = dataset
        .states
        .values()
        .filter_map(|state| {
            let metrics = state.metrics.as_ref()?;
            (!metrics.estimated.is_empty()).then_some((state, &metrics.estimated))
        })
        .collect();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Estimated Values");
    if estimated.is_empty() {
        let _ = writeln!(output, "Every value was computed from source data.");
    } else {
        for (state, keys) in estimated.iter() {
            let _ = writeln!(output, "- {}: {}", state.name, keys.join(", "));
        }
    }

    if !dataset.meta.data_sources.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Data Sources");
        for (name, source) in dataset.meta.data_sources.iter() {
            let _ = writeln!(output, "- {name}: {source}");
        }
    }

    output
}

/// Most and least affordable states by YAAI, `limit` of each.
pub fn affordability_summary(dataset: &Dataset, limit: usize) -> String {
    let ordered = yaai::affordability_order(dataset);
    let mut output = String::new();

    let _ = writeln!(output, "Most affordable (lowest YAAI):");
    for (position, (state, score)) in ordered.iter().take(limit).enumerate() {
        let _ = writeln!(output, "  {}. {}: {:.1}", position + 1, state.name, score);
    }

    let _ = writeln!(output, "Least affordable (highest YAAI):");
    for (position, (state, score)) in ordered.iter().rev().take(limit).enumerate() {
        let _ = writeln!(output, "  {}. {}: {:.1}", position + 1, state.name, score);
    }

    output
}
