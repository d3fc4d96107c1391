//! Composite scoring.

/// Averages a rank score and a magnitude score.
///
/// Null if either side is null. If either side is zero the composite is
/// `0` instead of the average; downstream reports depend on this, so a
/// zero rank with a positive magnitude still composites to `0`.
#[must_use]
pub fn composite_score(rank: Option<f64>, magnitude: Option<f64>) -> Option<f64> {
    let rank = rank?;
    let magnitude = magnitude?;
    if rank <= 0.0 || magnitude <= 0.0 {
        return Some(0.0);
    }
    Some((rank + magnitude) / 2.0)
}
