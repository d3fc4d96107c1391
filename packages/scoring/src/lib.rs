#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The J-Score statistical scoring engine.
//!
//! Everything in this crate is pure: observations go in, immutable
//! [`ScoreRecord`](jscore_scoring_models::ScoreRecord)s and
//! [`AggregateScoreRecord`](jscore_scoring_models::AggregateScoreRecord)s
//! come out. Fetching and persisting are the caller's job.
//!
//! Scores live on a 0–10 scale. Two independent scores are computed per
//! observation: a rank score from its ordinal position in its group and a
//! magnitude score from its ratio to the group maximum. A second magnitude
//! score is computed against a maximum with up to `K` extreme values
//! trimmed off, so one enormous region does not flatten everyone else.

pub mod aggregate;
pub mod composite;
pub mod group;
pub mod levels;
pub mod magnitude;
pub mod outlier;
pub mod rank;
pub mod stats;

use chrono::NaiveDate;
use jscore_region_models::SubDistrictId;

pub use aggregate::{RegionFactors, aggregate};
pub use group::GroupScorer;
pub use levels::{LevelScores, score_all_levels, score_level};

/// Upper bound of every score.
pub const MAX_SCORE: f64 = 10.0;

/// Errors that can occur while scoring a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    /// An observation belongs to a different snapshot than the batch.
    #[error("Observation for {sub_district} is dated {found}, expected {expected}")]
    ReferenceDateMismatch {
        /// The offending sub-district.
        sub_district: SubDistrictId,
        /// Date carried by the observation.
        found: NaiveDate,
        /// Date of the batch.
        expected: NaiveDate,
    },
}

#[cfg(test)]
pub(crate) mod test_utils {
    /// Asserts two optional floats agree to within `1e-9`.
    pub fn assert_close(actual: Option<f64>, expected: Option<f64>) {
        match (actual, expected) {
            (Some(a), Some(e)) => assert!(
                (a - e).abs() < 1e-9,
                "expected {e}, got {a} (diff {})",
                (a - e).abs()
            ),
            (None, None) => {}
            _ => panic!("expected {expected:?}, got {actual:?}"),
        }
    }
}
