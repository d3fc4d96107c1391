//! Bounded removal of extreme high values.
//!
//! Walking down from the second-highest value, the predecessor is removed
//! while its gap to the current value exceeds the group's population
//! standard deviation, up to `limit` removals. The walk stops at the first
//! gap that does not. Removed values always form a prefix of the sorted
//! group and are strictly greater than everything left.

/// The result of trimming a group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutlierSplit {
    outliers: Vec<f64>,
    trimmed_max: Option<f64>,
}

impl OutlierSplit {
    /// Values removed as outliers, largest first.
    #[must_use]
    pub fn outliers(&self) -> &[f64] {
        &self.outliers
    }

    /// Maximum of the values that were kept.
    #[must_use]
    pub const fn trimmed_max(&self) -> Option<f64> {
        self.trimmed_max
    }

    /// Whether `value` was removed as an outlier.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_outlier(&self, value: f64) -> bool {
        self.outliers.iter().any(|&o| o == value)
    }
}

/// Splits a group sorted largest first into outliers and the trimmed rest.
#[must_use]
pub fn split_outliers(sorted_desc: &[f64], stddev: f64, limit: usize) -> OutlierSplit {
    let mut removed = 0;
    for pair in sorted_desc.windows(2) {
        if removed >= limit {
            break;
        }
        if pair[0] - pair[1] > stddev {
            removed += 1;
        } else {
            break;
        }
    }

    OutlierSplit {
        outliers: sorted_desc[..removed].to_vec(),
        trimmed_max: sorted_desc.get(removed).copied(),
    }
}
