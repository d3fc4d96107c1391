#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch scoring and aggregation runs.
//!
//! A run is split into units: one per `(metric, level)` plus one aggregate
//! unit. Units run on a bounded `buffer_unordered` pool, persist with
//! wholesale retry, and fail alone: a failed unit is reported in the
//! [`BatchReport`] while its siblings carry on.

pub mod aggregate;
pub mod options;
pub mod progress;
pub mod retry;

use std::fmt;

use chrono::NaiveDate;
use futures::StreamExt as _;
use futures::stream;
use jscore_database::{DbError, ScoreStore};
use jscore_region_models::{GroupScope, StatLevel};
use jscore_scoring::{LevelScores, ScoringError, score_level};
use jscore_scoring_models::{MetricDefinition, Observation};

pub use aggregate::aggregate;
pub use options::BatchOptions;
pub use progress::{NullProgress, ProgressCallback};

use crate::retry::with_retry;

/// Errors that fail a single unit.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Store error after all retries.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// The observations could not be scored.
    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    /// The metric's observations could not be fetched, so none of its
    /// levels were scored.
    #[error("Fetching {metric} failed: {message}")]
    Fetch {
        /// Metric id.
        metric: String,
        /// The underlying store error.
        message: String,
    },

    /// A weighted factor names a metric that is not registered.
    #[error("Unknown metric: {metric}")]
    UnknownMetric {
        /// Metric id.
        metric: String,
    },
}

/// One independently retried piece of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    /// Scoring one metric at one level.
    Score {
        /// Metric id.
        metric: String,
        /// Level.
        level: StatLevel,
    },
    /// The weighted aggregate.
    Aggregate,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Score { metric, level } => write!(f, "{metric}/{level}"),
            Self::Aggregate => f.write_str("aggregate"),
        }
    }
}

/// How one unit ended.
#[derive(Debug)]
pub struct UnitOutcome {
    /// The unit.
    pub unit: Unit,
    /// Reference date of the run.
    pub ref_date: NaiveDate,
    /// Attempts made on the unit's persistence.
    pub attempts: u32,
    /// Records written, or why the unit failed.
    pub result: Result<usize, BatchError>,
}

impl UnitOutcome {
    /// Whether the unit committed its records.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a run.
#[derive(Debug)]
pub struct BatchReport {
    /// Reference date of the run.
    pub ref_date: NaiveDate,
    /// One entry per unit, in completion order.
    pub outcomes: Vec<UnitOutcome>,
}

impl BatchReport {
    /// An empty report.
    #[must_use]
    pub const fn new(ref_date: NaiveDate) -> Self {
        Self {
            ref_date,
            outcomes: Vec::new(),
        }
    }

    /// Units that committed.
    pub fn succeeded(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    /// Units that failed after all attempts.
    pub fn failed(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Whether every unit committed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Total records written by successful units.
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }

    /// Appends the outcomes of another report.
    pub fn extend(&mut self, other: Self) {
        self.outcomes.extend(other.outcomes);
    }

    /// Logs one line per failed unit and a totals line.
    pub fn log_summary(&self) {
        for outcome in self.failed() {
            if let Err(e) = &outcome.result {
                log::error!(
                    "{} on {} failed after {} attempts: {e}",
                    outcome.unit,
                    outcome.ref_date,
                    outcome.attempts
                );
            }
        }
        log::info!(
            "{}: {} units succeeded, {} failed, {} records written",
            self.ref_date,
            self.succeeded().count(),
            self.failed().count(),
            self.records_written()
        );
    }
}

struct Fetched<'a> {
    metric: &'a MetricDefinition,
    observations: Vec<Observation>,
}

/// Scores one metric at every level.
///
/// Observations are fetched once; the three level units then run on the
/// pool. A fetch failure fails all three units of this metric.
pub async fn score_metric(
    store: &dyn ScoreStore,
    metric: &MetricDefinition,
    ref_date: NaiveDate,
    options: &BatchOptions,
    progress: &dyn ProgressCallback,
) -> Vec<UnitOutcome> {
    score_metrics(store, std::slice::from_ref(metric), ref_date, options, progress)
        .await
        .outcomes
}

/// Scores every metric at every level on one bounded pool.
pub async fn score_metrics(
    store: &dyn ScoreStore,
    metrics: &[MetricDefinition],
    ref_date: NaiveDate,
    options: &BatchOptions,
    progress: &dyn ProgressCallback,
) -> BatchReport {
    let mut report = BatchReport::new(ref_date);
    let concurrency = options.concurrency.max(1);

    #[allow(clippy::cast_possible_truncation)]
    progress.set_total((metrics.len() * StatLevel::ALL.len()) as u64);

    let fetches: Vec<_> = stream::iter(metrics.iter().map(|metric| async move {
        let id = metric.id.as_str();
        let what = format!("fetching {id} observations");
        let fetched = with_retry(options, &what, || async move {
            store
                .fetch_observations(id, GroupScope::Nation, ref_date)
                .await
        })
        .await;
        (metric, fetched)
    }))
    .buffer_unordered(concurrency)
    .collect()
    .await;

    let mut ready = Vec::with_capacity(fetches.len());
    for (metric, fetched) in fetches {
        match fetched.result {
            Ok(observations) => {
                log::info!(
                    "Fetched {} observations of {} for {ref_date}",
                    observations.len(),
                    metric.id
                );
                ready.push(Fetched {
                    metric,
                    observations,
                });
            }
            Err(e) => {
                log::error!("Skipping {}: {e}", metric.id);
                for level in StatLevel::ALL {
                    report.outcomes.push(UnitOutcome {
                        unit: Unit::Score {
                            metric: metric.id.clone(),
                            level,
                        },
                        ref_date,
                        attempts: fetched.attempts,
                        result: Err(BatchError::Fetch {
                            metric: metric.id.clone(),
                            message: e.to_string(),
                        }),
                    });
                }
                progress.inc(StatLevel::ALL.len() as u64);
            }
        }
    }

    let units = ready
        .iter()
        .flat_map(|f| StatLevel::ALL.into_iter().map(move |level| (f, level)));

    let outcomes: Vec<UnitOutcome> = stream::iter(units.map(|(fetched, level)| async move {
        let outcome = score_unit(store, fetched, level, ref_date, options).await;
        progress.set_message(outcome.unit.to_string());
        progress.inc(1);
        outcome
    }))
    .buffer_unordered(concurrency)
    .collect()
    .await;

    report.outcomes.extend(outcomes);
    report
}

async fn score_unit(
    store: &dyn ScoreStore,
    fetched: &Fetched<'_>,
    level: StatLevel,
    ref_date: NaiveDate,
    options: &BatchOptions,
) -> UnitOutcome {
    let metric = fetched.metric;
    let unit = Unit::Score {
        metric: metric.id.clone(),
        level,
    };

    let scores = match score_level(metric, level, ref_date, &fetched.observations) {
        Ok(scores) => scores,
        Err(e) => {
            log::error!("Scoring {unit} failed: {e}");
            return UnitOutcome {
                unit,
                ref_date,
                attempts: 0,
                result: Err(e.into()),
            };
        }
    };

    let persisted = persist_level(store, &metric.id, &scores, ref_date, options, &unit).await;
    if persisted.result.is_ok() {
        log::info!(
            "Scored {unit}: {} records in {} groups",
            scores.records.len(),
            scores.groups.len()
        );
    }

    UnitOutcome {
        unit,
        ref_date,
        attempts: persisted.attempts,
        result: persisted.result.map_err(BatchError::from),
    }
}

async fn persist_level(
    store: &dyn ScoreStore,
    metric: &str,
    scores: &LevelScores,
    ref_date: NaiveDate,
    options: &BatchOptions,
    unit: &Unit,
) -> retry::Attempted<usize> {
    let what = format!("persisting {unit}");
    let level = scores.level;
    let records = scores.records.as_slice();
    let groups = scores.groups.as_slice();

    with_retry(options, &what, || {
        store.persist_level_scores(metric, level, ref_date, records, groups)
    })
    .await
}
