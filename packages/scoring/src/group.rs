//! Scoring of a single group.
//!
//! [`GroupScorer`] bundles the statistics, rank table and outlier split of
//! one group so every member is scored against the same denominators.

use jscore_scoring_models::{Scores, StatisticsSummary};

use crate::MAX_SCORE;
use crate::composite::composite_score;
use crate::magnitude::magnitude_score;
use crate::outlier::{OutlierSplit, split_outliers};
use crate::rank::RankTable;
use crate::stats::{is_scorable, scorable_values, summarize};

/// Precomputed state for scoring the members of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupScorer {
    summary: StatisticsSummary,
    ranks: RankTable,
    split: OutlierSplit,
}

impl GroupScorer {
    /// Builds a scorer from the raw (nullable) values of the group's
    /// members. Nulls, non-finite and non-positive values are left out of
    /// the statistics.
    pub fn new<I>(values: I, outlier_limit: usize) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let values = scorable_values(values);
        let summary = summarize(&values);
        let ranks = RankTable::new(&values);
        let split = summary.stddev.map_or_else(OutlierSplit::default, |stddev| {
            split_outliers(ranks.sorted(), stddev, outlier_limit)
        });

        Self {
            summary,
            ranks,
            split,
        }
    }

    /// Statistics of the group.
    #[must_use]
    pub const fn summary(&self) -> &StatisticsSummary {
        &self.summary
    }

    /// Number of values the statistics cover.
    #[must_use]
    pub fn scored_len(&self) -> usize {
        self.ranks.len()
    }

    /// Values removed as outliers.
    #[must_use]
    pub fn outliers(&self) -> &[f64] {
        self.split.outliers()
    }

    /// Scores one member's value.
    ///
    /// A null value, or any value in an empty group, gets [`Scores::NULL`].
    /// Outliers get the ceiling score for both trimmed scores; everyone
    /// else is measured against the trimmed maximum with their original
    /// rank.
    #[must_use]
    pub fn score(&self, value: Option<f64>) -> Scores {
        let value = value.filter(|v| v.is_finite());
        if value.is_none() || self.summary.is_empty() {
            return Scores::NULL;
        }

        let rank_score = self.ranks.score(value);
        let magnitude_score = magnitude_score(value, self.summary.max);
        let composite = composite_score(rank_score, magnitude_score);

        let is_outlier = value.is_some_and(|v| is_scorable(v) && self.split.is_outlier(v));
        let (magnitude_score_trimmed, composite_score_trimmed) = if is_outlier {
            (Some(MAX_SCORE), Some(MAX_SCORE))
        } else {
            let trimmed = crate::magnitude::magnitude_score(value, self.split.trimmed_max());
            (trimmed, composite_score(rank_score, trimmed))
        };

        Scores {
            rank_score,
            magnitude_score,
            composite_score: composite,
            magnitude_score_trimmed,
            composite_score_trimmed,
        }
    }
}
