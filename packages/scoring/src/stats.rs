//! Summary statistics over a group of values.

use jscore_scoring_models::StatisticsSummary;

/// Whether a value takes part in group statistics and ranking.
///
/// Only finite, strictly positive values do. Zero and negative values are
/// still scored (as `0`) but never shape the group.
#[must_use]
pub fn is_scorable(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Collects the scorable values out of a list of nullable values.
pub fn scorable_values<I>(values: I) -> Vec<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    values
        .into_iter()
        .flatten()
        .filter(|&v| is_scorable(v))
        .collect()
}

/// Sorts values largest first.
pub fn sort_descending(values: &mut [f64]) {
    values.sort_by(|a, b| b.total_cmp(a));
}

/// Computes mean, median, population standard deviation, max and min.
///
/// Returns [`StatisticsSummary::EMPTY`] when `values` is empty. Callers are
/// expected to have dropped null values already.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(values: &[f64]) -> StatisticsSummary {
    if values.is_empty() {
        return StatisticsSummary::EMPTY;
    }

    let n = values.len() as f64;
    let average = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - average).powi(2)).sum::<f64>() / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    };

    StatisticsSummary {
        average: Some(average),
        median: Some(median),
        stddev: Some(variance.sqrt()),
        max: sorted.last().copied(),
        min: sorted.first().copied(),
    }
}
