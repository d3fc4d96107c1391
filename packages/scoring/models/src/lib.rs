#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Observation, statistics and score record types for the J-Score engine.
//!
//! Records are plain values: the scoring pipeline builds each one in a
//! single expression and never patches fields afterwards.

use chrono::NaiveDate;
use jscore_region_models::{GroupScope, RegionPath, ScopedRegion, StatLevel};
use serde::{Deserialize, Serialize};

/// Identifier of a category within a metric (e.g. a business type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl std::fmt::Display for CategoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "category {}", self.0)
    }
}

/// A raw metric value for one sub-district and category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Where the value was observed.
    #[serde(flatten)]
    pub region: RegionPath,
    /// Category within the metric.
    pub category_id: CategoryId,
    /// The observed value; `None` when the source had no data.
    pub value: Option<f64>,
    /// Snapshot date the value belongs to.
    pub ref_date: NaiveDate,
}

/// Summary statistics over one group of values.
///
/// Every field is `None` exactly when the group was empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSummary {
    /// Arithmetic mean.
    pub average: Option<f64>,
    /// Median; mean of the two middle values for even-sized groups.
    pub median: Option<f64>,
    /// Population standard deviation.
    pub stddev: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
    /// Smallest value.
    pub min: Option<f64>,
}

impl StatisticsSummary {
    /// The summary of an empty group.
    pub const EMPTY: Self = Self {
        average: None,
        median: None,
        stddev: None,
        max: None,
        min: None,
    };

    /// Whether this summarizes an empty group.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.max.is_none()
    }
}

/// The five scores computed for one observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    /// Score from ordinal position in the group.
    pub rank_score: Option<f64>,
    /// Score from the ratio to the group maximum.
    pub magnitude_score: Option<f64>,
    /// Combination of rank and magnitude.
    pub composite_score: Option<f64>,
    /// Magnitude against the outlier-trimmed maximum.
    pub magnitude_score_trimmed: Option<f64>,
    /// Combination of rank and trimmed magnitude.
    pub composite_score_trimmed: Option<f64>,
}

impl Scores {
    /// All scores absent.
    pub const NULL: Self = Self {
        rank_score: None,
        magnitude_score: None,
        composite_score: None,
        magnitude_score_trimmed: None,
        composite_score_trimmed: None,
    };
}

/// A scored observation at one [`StatLevel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    /// Metric the observation belongs to.
    pub metric: String,
    /// Grouping level the scores were computed at.
    pub level: StatLevel,
    /// Region ids as carried at this level.
    #[serde(flatten)]
    pub region: ScopedRegion,
    /// Category within the metric.
    pub category_id: CategoryId,
    /// The raw value.
    pub value: Option<f64>,
    /// Computed scores.
    #[serde(flatten)]
    pub scores: Scores,
    /// Statistics of the group the observation was ranked in.
    pub stat: StatisticsSummary,
    /// Snapshot date.
    pub ref_date: NaiveDate,
}

/// Statistics for one group, persisted once per (group, level, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatistics {
    /// Metric the group belongs to.
    pub metric: String,
    /// The group.
    pub scope: GroupScope,
    /// Category within the metric.
    pub category_id: CategoryId,
    /// Number of observations in the group, including null values.
    pub observations: usize,
    /// Number of values the statistics were computed over.
    pub scored_values: usize,
    /// Number of values removed as outliers.
    pub outliers: usize,
    /// The summary itself.
    pub stat: StatisticsSummary,
    /// Snapshot date.
    pub ref_date: NaiveDate,
}

impl GroupStatistics {
    /// Level of the group.
    #[must_use]
    pub const fn level(&self) -> StatLevel {
        self.scope.level()
    }
}

/// A metric and its weight in the location aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedFactor {
    /// Metric id the factor reads nation-level scores from.
    pub metric_name: String,
    /// Constant multiplier.
    pub weight: f64,
}

/// The nation-level scores of one factor for one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorScores {
    /// Rank score.
    pub rank_score: Option<f64>,
    /// Ordinary magnitude score.
    pub magnitude_score: Option<f64>,
    /// Trimmed magnitude score.
    pub magnitude_score_trimmed: Option<f64>,
}

impl From<&ScoreRecord> for FactorScores {
    fn from(record: &ScoreRecord) -> Self {
        Self {
            rank_score: record.scores.rank_score,
            magnitude_score: record.scores.magnitude_score,
            magnitude_score_trimmed: record.scores.magnitude_score_trimmed,
        }
    }
}

/// The weighted cross-metric score of one sub-district.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateScoreRecord {
    /// The sub-district and its parents.
    #[serde(flatten)]
    pub region: RegionPath,
    /// Re-ranked averaged rank score.
    pub aggregate_rank_score: Option<f64>,
    /// Re-normalized averaged magnitude score.
    pub aggregate_magnitude_score: Option<f64>,
    /// Composite of the two above.
    pub aggregate_score: Option<f64>,
    /// Re-normalized averaged trimmed magnitude score.
    pub aggregate_magnitude_score_trimmed: Option<f64>,
    /// Composite of rank and trimmed magnitude.
    pub aggregate_score_trimmed: Option<f64>,
    /// Snapshot date.
    pub ref_date: NaiveDate,
}

/// A scorable metric, deserialized from the metric registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Unique metric identifier (e.g. `"foot_traffic"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the metric measures.
    #[serde(default)]
    pub description: String,
    /// Maximum number of high outliers trimmed per group.
    pub outlier_limit: usize,
    /// Category whose nation-level scores feed the weighted aggregate.
    pub aggregate_category: CategoryId,
}

impl MetricDefinition {
    /// Returns the metric identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human-readable metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
