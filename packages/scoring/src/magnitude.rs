//! Magnitude scoring: a value's ratio to its group maximum.

use crate::MAX_SCORE;

/// Scores `value` as `(value / max) * 10`.
///
/// Null value or unknown max yields `None`. A non-positive max or value
/// scores `0` rather than dividing.
#[must_use]
pub fn magnitude_score(value: Option<f64>, max: Option<f64>) -> Option<f64> {
    let value = value?;
    let max = max?;
    if max <= 0.0 || value <= 0.0 {
        return Some(0.0);
    }
    Some(value / max * MAX_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_close;

    #[test]
    fn ratio_to_max() {
        for (value, expected) in [(50.0, 10.0), (30.0, 6.0), (10.0, 2.0)] {
            assert_close(magnitude_score(Some(value), Some(50.0)), Some(expected));
        }
    }

    #[test]
    fn max_value_scores_exactly_ten() {
        let max = 123.456_789;
        assert_eq!(magnitude_score(Some(max), Some(max)), Some(10.0));
    }

    #[test]
    fn zero_max_guards_division() {
        assert_eq!(magnitude_score(Some(5.0), Some(0.0)), Some(0.0));
        assert_eq!(magnitude_score(Some(0.0), Some(0.0)), Some(0.0));
    }

    #[test]
    fn negative_value_clamps_to_zero() {
        assert_eq!(magnitude_score(Some(-3.0), Some(10.0)), Some(0.0));
    }

    #[test]
    fn nulls_propagate() {
        assert_eq!(magnitude_score(None, Some(10.0)), None);
        assert_eq!(magnitude_score(Some(1.0), None), None);
    }
}
