//! Barometer index calculation.
//!
//! Every indicator is described by an [`IndicatorSpec`] row in [`Tables`] and
//! evaluated by the same routine: formula, regional multiplier, optional
//! search-trend boost, clamp, round. The calculator does no I/O and draws no
//! random numbers; values it cannot compute stay `None` for the gap filler.

use std::collections::BTreeMap;

use crate::fetch::{HousingPrice, Poverty, SourceData, Unemployment};
use crate::models::{Indicator, IndicatorValue, Metrics, RentSource, StateRecord};
use crate::reference::ReferenceData;
use crate::states;

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    #[cfg(test)]
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    UnemploymentRate,
    PovertyRate,
}

/// `(base + (metric - baseline) * multiplier) * regional`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFormula {
    pub metric: Metric,
    pub base: f64,
    pub baseline: f64,
    pub multiplier: f64,
}

/// `(base + hpi_change * hpi_multiplier + rent_penalty) * regional`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HousingFormula {
    pub base: f64,
    pub hpi_multiplier: f64,
    /// Stands in for the price change when FRED had no year-ago observation.
    pub default_hpi_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    pub indicator: Indicator,
    pub weight: f64,
    /// Multiplied by the regional factor when the component has no value.
    pub fallback: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    Linear(LinearFormula),
    Housing(HousingFormula),
    /// Weighted sum of indicators evaluated earlier in the table.
    Composite(Vec<Component>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSpec {
    pub indicator: Indicator,
    pub formula: Formula,
    /// Trend boost is `interest / divisor`; `None` ignores search trends.
    pub trend_divisor: Option<f64>,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RentTier {
    /// Applies when state rent exceeds `ratio` times the national average.
    pub ratio: f64,
    pub penalty: f64,
}

/// Constant tables the calculator runs on.
#[derive(Debug, Clone)]
pub struct Tables {
    pub regional: BTreeMap<&'static str, f64>,
    /// Evaluated in order; composites must come after their components.
    pub indicators: Vec<IndicatorSpec>,
    /// Highest ratio first.
    pub rent_tiers: Vec<RentTier>,
    /// Penalties for states no rent source covers.
    pub fallback_tiers: Vec<(f64, Vec<&'static str>)>,
}

impl Tables {
    pub fn standard() -> Self {
        let regional = states::STATES
            .iter()
            .map(|info| (info.abbr, info.regional_stress))
            .collect();

        let indicators = vec![
            IndicatorSpec {
                indicator: Indicator::FinancialAnxiety,
                formula: Formula::Linear(LinearFormula {
                    metric: Metric::UnemploymentRate,
                    base: 120.0,
                    baseline: 3.5,
                    multiplier: 18.0,
                }),
                trend_divisor: None,
                bounds: Bounds::new(80.0, 200.0),
            },
            IndicatorSpec {
                indicator: Indicator::FoodInsecurity,
                formula: Formula::Linear(LinearFormula {
                    metric: Metric::PovertyRate,
                    base: 85.0,
                    baseline: 10.0,
                    multiplier: 6.0,
                }),
                trend_divisor: Some(10.0),
                bounds: Bounds::new(55.0, 160.0),
            },
            IndicatorSpec {
                indicator: Indicator::HousingStress,
                formula: Formula::Housing(HousingFormula {
                    base: 135.0,
                    hpi_multiplier: 6.0,
                    default_hpi_change: 5.0,
                }),
                trend_divisor: Some(8.0),
                bounds: Bounds::new(100.0, 250.0),
            },
            IndicatorSpec {
                indicator: Indicator::Affordability,
                formula: Formula::Composite(vec![
                    Component {
                        indicator: Indicator::HousingStress,
                        weight: 0.60,
                        fallback: 130.0,
                    },
                    Component {
                        indicator: Indicator::FoodInsecurity,
                        weight: 0.40,
                        fallback: 95.0,
                    },
                ]),
                trend_divisor: Some(10.0),
                bounds: Bounds::new(80.0, 200.0),
            },
        ];

        let rent_tiers = vec![
            RentTier {
                ratio: 1.25,
                penalty: 30.0,
            },
            RentTier {
                ratio: 1.10,
                penalty: 20.0,
            },
            RentTier {
                ratio: 1.00,
                penalty: 10.0,
            },
        ];

        let fallback_tiers = vec![
            (30.0, vec!["CA", "NY", "MA", "HI", "DC"]),
            (20.0, vec!["NJ", "WA", "CO", "FL", "MD"]),
            (10.0, vec!["OR", "NH", "CT", "VA", "AZ", "NV", "TX"]),
        ];

        Self {
            regional,
            indicators,
            rent_tiers,
            fallback_tiers,
        }
    }

    pub fn regional(&self, abbr: &str) -> f64 {
        self.regional.get(abbr).copied().unwrap_or(1.0)
    }

    pub fn spec(&self, indicator: Indicator) -> Option<&IndicatorSpec> {
        self.indicators.iter().find(|spec| spec.indicator == indicator)
    }

    pub fn bounds(&self, indicator: Indicator) -> Option<Bounds> {
        self.spec(indicator).map(|spec| spec.bounds)
    }

    pub fn fallback_penalty(&self, abbr: &str) -> f64 {
        self.fallback_tiers
            .iter()
            .find(|(_, members)| members.iter().any(|member| *member == abbr))
            .map_or(0.0, |(penalty, _)| *penalty)
    }
}

/// Penalty of the highest tier the state's rent crosses.
pub fn rent_penalty(state_rent: f64, national_average: f64, tiers: &[RentTier]) -> f64 {
    tiers
        .iter()
        .find(|tier| state_rent > national_average * tier.ratio)
        .map_or(0.0, |tier| tier.penalty)
}

/// One rent series with the average over the states it covers.
#[derive(Debug, Clone, PartialEq)]
struct RentBasis {
    source: RentSource,
    rents: BTreeMap<String, f64>,
    national_average: f64,
}

/// A state's rent and the average of the series it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StateRent {
    source: RentSource,
    rent: f64,
    national_average: f64,
}

/// Non-empty rent series in priority order: ACS median gross rent, HUD fair
/// market rent, reference median rent.
fn rent_bases(sources: &SourceData, reference: Option<&ReferenceData>) -> Vec<RentBasis> {
    let acs = sources.rent.as_ref().map(|rent| {
        rent.iter()
            .filter_map(|(abbr, entry)| entry.median_rent.map(|value| (abbr.clone(), value)))
            .collect::<BTreeMap<_, _>>()
    });
    let reference = reference.map(|reference| {
        reference
            .states
            .keys()
            .filter_map(|abbr| reference.median_rent(abbr).map(|value| (abbr.clone(), value)))
            .collect::<BTreeMap<_, _>>()
    });

    [
        (RentSource::Acs, acs),
        (RentSource::HudFmr, sources.fmr.clone()),
        (RentSource::Reference, reference),
    ]
    .into_iter()
    .filter_map(|(source, rents)| {
        let rents = rents.filter(|rents| !rents.is_empty())?;
        let national_average = rents.values().sum::<f64>() / rents.len() as f64;
        Some(RentBasis {
            source,
            rents,
            national_average,
        })
    })
    .collect()
}

/// Rent from the first series covering the state.
fn resolve_rent(bases: &[RentBasis], abbr: &str) -> Option<StateRent> {
    bases.iter().find_map(|basis| {
        basis.rents.get(abbr).map(|rent| StateRent {
            source: basis.source,
            rent: *rent,
            national_average: basis.national_average,
        })
    })
}

/// Everything known about one state before evaluation.
struct StateInputs<'a> {
    abbr: &'a str,
    regional: f64,
    unemployment: Option<&'a Unemployment>,
    poverty: Option<&'a Poverty>,
    housing: Option<&'a HousingPrice>,
    rent: Option<StateRent>,
}

fn evaluate_linear(formula: &LinearFormula, inputs: &StateInputs) -> Option<(f64, Option<f64>)> {
    let (metric, previous) = match formula.metric {
        Metric::UnemploymentRate => inputs
            .unemployment
            .map(|unemployment| (unemployment.value, unemployment.previous))?,
        Metric::PovertyRate => inputs.poverty.map(|poverty| (poverty.poverty_rate, None))?,
    };

    let raw = (formula.base + (metric - formula.baseline) * formula.multiplier) * inputs.regional;
    let change = previous
        .filter(|previous| *previous != 0.0)
        .map(|previous| round_to((metric - previous) / previous * 100.0, 1));
    Some((raw, change))
}

fn evaluate_housing(formula: &HousingFormula, inputs: &StateInputs, tables: &Tables) -> Option<(f64, Option<f64>)> {
    let housing = inputs.housing?;
    let hpi_change = housing.change.unwrap_or(formula.default_hpi_change);

    let penalty = match inputs.rent {
        Some(rent) => rent_penalty(rent.rent, rent.national_average, &tables.rent_tiers),
        None => tables.fallback_penalty(inputs.abbr),
    };

    let raw = (formula.base + hpi_change * formula.hpi_multiplier + penalty) * inputs.regional;
    Some((raw, Some(round_to(hpi_change, 1))))
}

fn evaluate_composite(components: &[Component], inputs: &StateInputs, record: &StateRecord) -> (f64, Option<f64>) {
    let raw = components
        .iter()
        .map(|component| {
            let value = record
                .value(component.indicator.key())
                .unwrap_or(component.fallback * inputs.regional);
            value * component.weight
        })
        .sum();
    (raw, None)
}

/// Computes the four Barometer indicators for all 51 states, keyed by state
/// code. Indicators without input data come back with a `None` value.
pub fn calculate(
    sources: &SourceData,
    reference: Option<&ReferenceData>,
    tables: &Tables,
) -> BTreeMap<String, StateRecord> {
    let bases = rent_bases(sources, reference);
    let mut results = BTreeMap::new();

    for info in states::STATES.iter() {
        let abbr = info.abbr;
        let acs = sources.rent.as_ref().and_then(|rent| rent.get(abbr));

        let inputs = StateInputs {
            abbr,
            regional: tables.regional(abbr),
            unemployment: sources.unemployment.as_ref().and_then(|map| map.get(abbr)),
            poverty: sources.poverty.as_ref().and_then(|map| map.get(abbr)),
            housing: sources.housing.as_ref().and_then(|map| map.get(abbr)),
            rent: resolve_rent(&bases, abbr),
        };

        let mut record = StateRecord::new(info.name, abbr);
        for spec in tables.indicators.iter() {
            let evaluated = match &spec.formula {
                Formula::Linear(formula) => evaluate_linear(formula, &inputs),
                Formula::Housing(formula) => evaluate_housing(formula, &inputs, tables),
                Formula::Composite(components) => Some(evaluate_composite(components, &inputs, &record)),
            };

            let reading = match evaluated {
                Some((raw, change)) => {
                    let boost = spec
                        .trend_divisor
                        .zip(trend_interest(sources, spec.indicator, abbr))
                        .map_or(0.0, |(divisor, interest)| interest / divisor);
                    IndicatorValue::new(spec.bounds.clamp(raw + boost).round(), change)
                }
                None => IndicatorValue::missing(),
            };
            record.indicators.insert(spec.indicator.key().to_string(), reading);
        }

        record.metrics = Some(Metrics {
            unemployment_rate: inputs.unemployment.map(|unemployment| unemployment.value),
            poverty_rate: inputs.poverty.map(|poverty| poverty.poverty_rate),
            child_poverty_rate: inputs.poverty.and_then(|poverty| poverty.child_poverty_rate),
            median_rent: inputs.rent.map(|rent| rent.rent),
            housing_price_change: inputs.housing.and_then(|housing| housing.change),
            rent_burden: acs.and_then(|acs| acs.rent_burden),
            cost_burdened_pct: reference.and_then(|reference| reference.cost_burden(abbr)),
            fair_market_rent: sources.fmr.as_ref().and_then(|fmr| fmr.get(abbr).copied()),
            rent_source: Some(inputs.rent.map_or(RentSource::FallbackTiers, |rent| rent.source)),
            regional_stress_multiplier: inputs.regional,
            estimated: Vec::new(),
        });

        results.insert(info.code(), record);
    }

    results
}

fn trend_interest(sources: &SourceData, indicator: Indicator, abbr: &str) -> Option<f64> {
    sources
        .trends
        .as_ref()
        .and_then(|trends| trends.get(&indicator))
        .and_then(|by_state| by_state.get(abbr))
        .copied()
}
