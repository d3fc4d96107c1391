//! Rank scoring.
//!
//! A value's rank is the 1-based position of its first occurrence in the
//! group sorted largest first, so tied values share the best rank among
//! them. The score is `10 * (total + 1 - rank) / total`.

use crate::MAX_SCORE;
use crate::stats::sort_descending;

/// A group's values sorted for rank lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct RankTable {
    sorted: Vec<f64>,
}

impl RankTable {
    /// Builds a table over the group's values. Duplicates are kept.
    #[must_use]
    pub fn new(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sort_descending(&mut sorted);
        Self { sorted }
    }

    /// Group size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    /// Whether the group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// The values, largest first.
    #[must_use]
    pub fn sorted(&self) -> &[f64] {
        &self.sorted
    }

    /// Returns the 1-based rank of the first occurrence of `value`, or
    /// `None` if the value is not in the group.
    #[must_use]
    pub fn rank_of(&self, value: f64) -> Option<usize> {
        let idx = self.sorted.partition_point(|&v| v > value);
        #[allow(clippy::float_cmp)]
        let found = self.sorted.get(idx).is_some_and(|&v| v == value);
        found.then_some(idx + 1)
    }

    /// Scores a value against the group.
    ///
    /// Null stays null. Values of zero or less score `0` without a lookup.
    /// A positive value that is not part of the group cannot be ranked and
    /// yields `None`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, value: Option<f64>) -> Option<f64> {
        let value = value?;
        if value <= 0.0 {
            return Some(0.0);
        }
        let rank = self.rank_of(value)?;
        let total = self.sorted.len() as f64;
        Some(MAX_SCORE * (total + 1.0 - rank as f64) / total)
    }
}
