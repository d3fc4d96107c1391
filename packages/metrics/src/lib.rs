#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Compile-time registry of scored metrics and aggregate weights.
//!
//! Each metric is a TOML file in `metrics/` embedded via `include_str!`.
//! Adding a metric requires creating the file and adding an entry to
//! [`METRIC_TOMLS`]. The weighted factors of the location aggregate live
//! in `factors.toml`.

use jscore_scoring_models::{MetricDefinition, WeightedFactor};
use serde::Deserialize;

/// Number of registered metrics. Enforced by a test.
#[cfg(test)]
const EXPECTED_METRIC_COUNT: usize = 11;

/// Number of weighted factors. Enforced by a test.
#[cfg(test)]
const EXPECTED_FACTOR_COUNT: usize = 9;

/// Embedded TOML metric definitions.
const METRIC_TOMLS: &[(&str, &str)] = &[
    ("market_size", include_str!("../metrics/market_size.toml")),
    ("usage_count", include_str!("../metrics/usage_count.toml")),
    ("store_count", include_str!("../metrics/store_count.toml")),
    ("sales", include_str!("../metrics/sales.toml")),
    ("foot_traffic", include_str!("../metrics/foot_traffic.toml")),
    ("residents", include_str!("../metrics/residents.toml")),
    ("workers", include_str!("../metrics/workers.toml")),
    ("households", include_str!("../metrics/households.toml")),
    ("income", include_str!("../metrics/income.toml")),
    ("spending", include_str!("../metrics/spending.toml")),
    (
        "apartment_price",
        include_str!("../metrics/apartment_price.toml"),
    ),
];

const FACTORS_TOML: &str = include_str!("../factors.toml");

#[derive(Deserialize)]
struct FactorList {
    factor: Vec<WeightedFactor>,
}

/// Returns all registered metrics.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse. Since these are
/// compile-time constants, parse failures indicate a development error
/// and are caught by the tests below.
#[must_use]
pub fn all_metrics() -> Vec<MetricDefinition> {
    METRIC_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse metric '{name}': {e}"))
        })
        .collect()
}

/// Looks up a metric by id.
#[must_use]
pub fn find_metric(id: &str) -> Option<MetricDefinition> {
    all_metrics().into_iter().find(|m| m.id == id)
}

/// Returns the weighted factors of the location aggregate, in order.
///
/// # Panics
///
/// Panics if the embedded `factors.toml` fails to parse.
#[must_use]
pub fn weighted_factors() -> Vec<WeightedFactor> {
    toml::de::from_str::<FactorList>(FACTORS_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse factors.toml: {e}"))
        .factor
}

/// Returns the metrics to score, filtered by the `--metrics` CLI flag or
/// the `JSCORE_METRICS` environment variable. If neither is set, all
/// metrics are returned.
#[must_use]
pub fn enabled_metrics(cli_filter: Option<String>) -> Vec<MetricDefinition> {
    let filter = cli_filter.or_else(|| std::env::var("JSCORE_METRICS").ok());

    let all = all_metrics();

    let Some(filter_str) = filter else {
        return all;
    };

    let ids: Vec<&str> = filter_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let filtered: Vec<MetricDefinition> =
        all.into_iter().filter(|m| ids.contains(&m.id())).collect();

    if filtered.is_empty() {
        log::warn!(
            "No matching metrics found for filter {:?}. Available: {}",
            ids,
            all_metrics()
                .iter()
                .map(|m| m.id.clone())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    filtered
}
