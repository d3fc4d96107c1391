//! In-process [`ScoreStore`] for tests and dry runs.
//!
//! Observations are seeded directly; everything the scorer persists can be
//! read back. Failures can be injected per operation to exercise retries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use jscore_region_models::{GroupScope, RegionTree, StatLevel};
use jscore_scoring_models::{
    AggregateScoreRecord, CategoryId, GroupStatistics, Observation, ScoreRecord,
};

use crate::{DbError, ScoreStore};

/// An operation that can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailTarget {
    /// `fetch_observations` and `fetch_prior_scores` for one metric.
    Fetch {
        /// Metric id.
        metric: String,
    },
    /// Score record and group statistic writes for one metric, at one level
    /// or at every level when `level` is `None`.
    Persist {
        /// Metric id.
        metric: String,
        /// Level, or every level.
        level: Option<StatLevel>,
    },
    /// The group statistic half of a level write for one metric. The score
    /// records of the same write are discarded with it.
    Statistics {
        /// Metric id.
        metric: String,
    },
    /// Aggregate record writes.
    Aggregates,
}

#[derive(Debug)]
struct FailureRule {
    target: FailTarget,
    remaining: Option<u32>,
}

type ScoreKey = (String, StatLevel, NaiveDate);

#[derive(Debug)]
struct MemoryState {
    regions: RegionTree,
    observations: BTreeMap<(String, NaiveDate), Vec<Observation>>,
    scores: BTreeMap<ScoreKey, Vec<ScoreRecord>>,
    statistics: BTreeMap<ScoreKey, Vec<GroupStatistics>>,
    aggregates: BTreeMap<NaiveDate, Vec<AggregateScoreRecord>>,
    failures: Vec<FailureRule>,
    persist_calls: usize,
}

impl MemoryState {
    fn take_failure(&mut self, hit: impl Fn(&FailTarget) -> bool) -> Result<(), DbError> {
        let Some(rule) = self
            .failures
            .iter_mut()
            .find(|r| r.remaining != Some(0) && hit(&r.target))
        else {
            return Ok(());
        };

        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }

        Err(DbError::Unavailable {
            message: format!("injected failure for {:?}", rule.target),
        })
    }

    fn check_fetch(&mut self, metric: &str) -> Result<(), DbError> {
        self.take_failure(|t| matches!(t, FailTarget::Fetch { metric: m } if m == metric))
    }

    fn check_persist(&mut self, metric: &str, level: StatLevel) -> Result<(), DbError> {
        self.take_failure(|t| match t {
            FailTarget::Persist { metric: m, level: l } => {
                m == metric && l.is_none_or(|l| l == level)
            }
            _ => false,
        })
    }

    fn check_statistics(&mut self, metric: &str) -> Result<(), DbError> {
        self.take_failure(|t| matches!(t, FailTarget::Statistics { metric: m } if m == metric))
    }
}

/// A [`ScoreStore`] holding everything in memory.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store over `regions`.
    #[must_use]
    pub const fn new(regions: RegionTree) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                regions,
                observations: BTreeMap::new(),
                scores: BTreeMap::new(),
                statistics: BTreeMap::new(),
                aggregates: BTreeMap::new(),
                failures: Vec::new(),
                persist_calls: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds raw observations of `metric`. Regions without an observation
    /// are later fetched with a null value.
    pub fn insert_observations(
        &self,
        metric: &str,
        observations: impl IntoIterator<Item = Observation>,
    ) {
        let mut state = self.state();
        for obs in observations {
            state
                .observations
                .entry((metric.to_string(), obs.ref_date))
                .or_default()
                .push(obs);
        }
    }

    /// Makes operations matching `target` fail. `times = None` fails them
    /// forever, otherwise only the next `times` matching calls fail.
    pub fn fail(&self, target: FailTarget, times: Option<u32>) {
        self.state().failures.push(FailureRule {
            target,
            remaining: times,
        });
    }

    /// Stored score records of `(metric, level, ref_date)`.
    #[must_use]
    pub fn score_records(
        &self,
        metric: &str,
        level: StatLevel,
        ref_date: NaiveDate,
    ) -> Vec<ScoreRecord> {
        self.state()
            .scores
            .get(&(metric.to_string(), level, ref_date))
            .cloned()
            .unwrap_or_default()
    }

    /// Stored group statistics of `(metric, level, ref_date)`.
    #[must_use]
    pub fn group_statistics(
        &self,
        metric: &str,
        level: StatLevel,
        ref_date: NaiveDate,
    ) -> Vec<GroupStatistics> {
        self.state()
            .statistics
            .get(&(metric.to_string(), level, ref_date))
            .cloned()
            .unwrap_or_default()
    }

    /// Stored aggregate records of `ref_date`.
    #[must_use]
    pub fn aggregate_records(&self, ref_date: NaiveDate) -> Vec<AggregateScoreRecord> {
        self.state()
            .aggregates
            .get(&ref_date)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of score record writes attempted, failed ones included.
    #[must_use]
    pub fn persist_calls(&self) -> usize {
        self.state().persist_calls
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn fetch_regions(&self) -> Result<RegionTree, DbError> {
        Ok(self.state().regions.clone())
    }

    async fn fetch_observations(
        &self,
        metric: &str,
        scope: GroupScope,
        ref_date: NaiveDate,
    ) -> Result<Vec<Observation>, DbError> {
        let mut state = self.state();
        state.check_fetch(metric)?;

        let Some(stored) = state.observations.get(&(metric.to_string(), ref_date)) else {
            return Ok(Vec::new());
        };

        let categories: BTreeSet<CategoryId> = stored.iter().map(|o| o.category_id).collect();
        let paths = state.regions.sub_district_paths();

        let mut observations = Vec::new();
        for category_id in categories {
            for path in paths.iter().filter(|p| scope.contains(p)) {
                let value = stored
                    .iter()
                    .find(|o| {
                        o.category_id == category_id
                            && o.region.sub_district_id == path.sub_district_id
                    })
                    .and_then(|o| o.value);
                observations.push(Observation {
                    region: *path,
                    category_id,
                    value,
                    ref_date,
                });
            }
        }

        Ok(observations)
    }

    async fn fetch_prior_scores(
        &self,
        metric: &str,
        category_id: CategoryId,
        ref_date: NaiveDate,
    ) -> Result<Vec<ScoreRecord>, DbError> {
        let mut state = self.state();
        state.check_fetch(metric)?;

        let mut records: Vec<ScoreRecord> = state
            .scores
            .get(&(metric.to_string(), StatLevel::Nation, ref_date))
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.category_id == category_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.region.sub_district_id);

        Ok(records)
    }

    async fn persist_level_scores(
        &self,
        metric: &str,
        level: StatLevel,
        ref_date: NaiveDate,
        records: &[ScoreRecord],
        groups: &[GroupStatistics],
    ) -> Result<usize, DbError> {
        let mut state = self.state();
        state.persist_calls += 1;
        state.check_persist(metric, level)?;
        state.check_statistics(metric)?;

        let key = (metric.to_string(), level, ref_date);
        state.scores.insert(key.clone(), records.to_vec());
        state.statistics.insert(key, groups.to_vec());
        Ok(records.len())
    }

    async fn persist_aggregate_records(
        &self,
        ref_date: NaiveDate,
        records: &[AggregateScoreRecord],
    ) -> Result<usize, DbError> {
        let mut state = self.state();
        state.take_failure(|t| *t == FailTarget::Aggregates)?;
        state.aggregates.insert(ref_date, records.to_vec());
        Ok(records.len())
    }
}
