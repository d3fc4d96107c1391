//! Weighted aggregation of nation-level scores across metrics.
//!
//! Each sub-district's factor scores are weighted and averaged, but only
//! when every factor is present: a region missing any factor gets a null
//! aggregate for that score type and stays in the output. The averaged
//! magnitudes are then re-normalized against the best region and the
//! averaged ranks are re-ranked across all regions.

use chrono::NaiveDate;
use jscore_region_models::RegionPath;
use jscore_scoring_models::{AggregateScoreRecord, FactorScores, WeightedFactor};

use crate::composite::composite_score;
use crate::magnitude::magnitude_score;
use crate::rank::RankTable;
use crate::stats::scorable_values;

/// One region's scores for each weighted factor.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFactors {
    /// The region.
    pub region: RegionPath,
    /// Scores aligned index-for-index with the factor list; `None` when the
    /// factor had no record for this region.
    pub factors: Vec<Option<FactorScores>>,
}

#[derive(Debug, Clone, Copy)]
struct Averaged {
    rank: Option<f64>,
    magnitude: Option<f64>,
    magnitude_trimmed: Option<f64>,
}

/// Weighted mean of one score type, or `None` unless every factor has it.
#[allow(clippy::cast_precision_loss)]
fn weighted_mean<F>(
    weights: &[WeightedFactor],
    scores: &[Option<FactorScores>],
    pick: F,
) -> Option<f64>
where
    F: Fn(&FactorScores) -> Option<f64>,
{
    if weights.is_empty() {
        return None;
    }

    let mut sum = 0.0;
    for (idx, factor) in weights.iter().enumerate() {
        let value = scores
            .get(idx)
            .copied()
            .flatten()
            .and_then(|s| pick(&s))?;
        sum += value * factor.weight;
    }

    Some(sum / weights.len() as f64)
}

fn global_max(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values.flatten().reduce(f64::max)
}

/// Combines per-factor scores into one aggregate record per region.
///
/// Output order matches `regions`.
#[must_use]
pub fn aggregate(
    factors: &[WeightedFactor],
    regions: &[RegionFactors],
    ref_date: NaiveDate,
) -> Vec<AggregateScoreRecord> {
    let averaged: Vec<Averaged> = regions
        .iter()
        .map(|r| Averaged {
            rank: weighted_mean(factors, &r.factors, |s| s.rank_score),
            magnitude: weighted_mean(factors, &r.factors, |s| s.magnitude_score),
            magnitude_trimmed: weighted_mean(factors, &r.factors, |s| s.magnitude_score_trimmed),
        })
        .collect();

    let incomplete = averaged.iter().filter(|a| a.rank.is_none()).count();
    if incomplete > 0 {
        log::warn!(
            "{incomplete} of {} regions are missing at least one factor and get no aggregate rank",
            regions.len()
        );
    }

    let ranks = RankTable::new(&scorable_values(averaged.iter().map(|a| a.rank)));
    let magnitude_max = global_max(averaged.iter().map(|a| a.magnitude));
    let trimmed_max = global_max(averaged.iter().map(|a| a.magnitude_trimmed));

    regions
        .iter()
        .zip(&averaged)
        .map(|(region, avg)| {
            let rank = ranks.score(avg.rank);
            let magnitude = magnitude_score(avg.magnitude, magnitude_max);
            let magnitude_trimmed = magnitude_score(avg.magnitude_trimmed, trimmed_max);

            AggregateScoreRecord {
                region: region.region,
                aggregate_rank_score: rank,
                aggregate_magnitude_score: magnitude,
                aggregate_score: composite_score(rank, magnitude),
                aggregate_magnitude_score_trimmed: magnitude_trimmed,
                aggregate_score_trimmed: composite_score(rank, magnitude_trimmed),
                ref_date,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_close;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn factors() -> Vec<WeightedFactor> {
        vec![
            WeightedFactor {
                metric_name: "store_count".to_string(),
                weight: 1.0,
            },
            WeightedFactor {
                metric_name: "foot_traffic".to_string(),
                weight: 2.5,
            },
        ]
    }

    fn scores(rank: f64, magnitude: f64) -> Option<FactorScores> {
        Some(FactorScores {
            rank_score: Some(rank),
            magnitude_score: Some(magnitude),
            magnitude_score_trimmed: Some(magnitude),
        })
    }

    fn region(sub: i64, factors: Vec<Option<FactorScores>>) -> RegionFactors {
        RegionFactors {
            region: RegionPath::new(1, 10, sub),
            factors,
        }
    }

    #[test]
    fn weights_average_and_renormalize() {
        let regions = vec![
            // rank avg (10*1 + 10*2.5)/2 = 17.5, magnitude avg (10 + 25)/2 = 17.5
            region(100, vec![scores(10.0, 10.0), scores(10.0, 10.0)]),
            // rank avg (5 + 12.5)/2 = 8.75, magnitude avg (4 + 5)/2 = 4.5
            region(101, vec![scores(5.0, 4.0), scores(5.0, 2.0)]),
        ];
        let out = aggregate(&factors(), &regions, date());
        assert_eq!(out.len(), 2);

        assert_close(out[0].aggregate_rank_score, Some(10.0));
        assert_close(out[0].aggregate_magnitude_score, Some(10.0));
        assert_close(out[0].aggregate_score, Some(10.0));

        assert_close(out[1].aggregate_rank_score, Some(5.0));
        assert_close(out[1].aggregate_magnitude_score, Some(4.5 / 17.5 * 10.0));
        assert_close(out[1].aggregate_score, Some((5.0 + 4.5 / 17.5 * 10.0) / 2.0));
        assert_eq!(out[1].ref_date, date());
    }

    #[test]
    fn missing_factor_nulls_aggregate_but_keeps_region() {
        let regions = vec![
            region(100, vec![scores(10.0, 10.0), scores(10.0, 10.0)]),
            region(101, vec![scores(5.0, 4.0), None]),
            region(102, vec![scores(2.0, 1.0), scores(2.0, 1.0)]),
        ];
        let out = aggregate(&factors(), &regions, date());
        assert_eq!(out.len(), 3);

        let missing = &out[1];
        assert_eq!(missing.aggregate_rank_score, None);
        assert_eq!(missing.aggregate_magnitude_score, None);
        assert_eq!(missing.aggregate_score, None);
        assert_eq!(missing.aggregate_score_trimmed, None);

        // Only complete regions are ranked: two of them.
        assert_close(out[0].aggregate_rank_score, Some(10.0));
        assert_close(out[2].aggregate_rank_score, Some(5.0));
        assert!(out[2].aggregate_score.is_some());
    }

    #[test]
    fn region_missing_one_of_nine_factors_is_null() {
        let weights = [1.0, 2.5, 1.5, 1.5, 2.0, 1.0, 1.0, 1.0, 1.5];
        let factors: Vec<WeightedFactor> = weights
            .iter()
            .enumerate()
            .map(|(idx, &weight)| WeightedFactor {
                metric_name: format!("factor_{idx}"),
                weight,
            })
            .collect();

        let complete = |base: f64| -> Vec<Option<FactorScores>> {
            (0..weights.len())
                .map(|idx| {
                    #[allow(clippy::cast_precision_loss)]
                    let step = idx as f64 * 0.1;
                    scores(base - step, base - step)
                })
                .collect()
        };
        let mut gap = complete(9.0);
        gap[4] = None;

        let regions = vec![
            region(100, complete(9.0)),
            region(101, gap),
            region(102, complete(6.0)),
            region(103, complete(3.0)),
        ];
        let out = aggregate(&factors, &regions, date());
        assert_eq!(out.len(), 4);

        let missing = &out[1];
        assert_eq!(missing.region.sub_district_id, regions[1].region.sub_district_id);
        assert_eq!(missing.aggregate_rank_score, None);
        assert_eq!(missing.aggregate_magnitude_score, None);
        assert_eq!(missing.aggregate_score, None);
        assert_eq!(missing.aggregate_score_trimmed, None);

        for record in [&out[0], &out[2], &out[3]] {
            for score in [
                record.aggregate_rank_score,
                record.aggregate_magnitude_score,
                record.aggregate_score,
                record.aggregate_score_trimmed,
            ] {
                let score = score.unwrap();
                assert!(score > 0.0 && score <= 10.0, "{score} out of range");
            }
        }
        assert_close(out[0].aggregate_score, Some(10.0));
        assert_close(out[3].aggregate_rank_score, Some(10.0 / 3.0));
    }

    #[test]
    fn null_score_type_only_nulls_that_type() {
        let partial = Some(FactorScores {
            rank_score: Some(4.0),
            magnitude_score: Some(3.0),
            magnitude_score_trimmed: None,
        });
        let regions = vec![region(100, vec![scores(8.0, 8.0), partial])];
        let out = aggregate(&factors(), &regions, date());
        assert!(out[0].aggregate_score.is_some());
        assert_eq!(out[0].aggregate_magnitude_score_trimmed, None);
        assert_eq!(out[0].aggregate_score_trimmed, None);
    }

    #[test]
    fn short_factor_list_counts_as_missing() {
        let regions = vec![region(100, vec![scores(8.0, 8.0)])];
        let out = aggregate(&factors(), &regions, date());
        assert_eq!(out[0].aggregate_score, None);
    }

    #[test]
    fn zero_scores_composite_to_zero() {
        let regions = vec![
            region(100, vec![scores(10.0, 10.0), scores(10.0, 10.0)]),
            region(101, vec![scores(0.0, 0.0), scores(0.0, 0.0)]),
        ];
        let out = aggregate(&factors(), &regions, date());
        assert_eq!(out[1].aggregate_rank_score, Some(0.0));
        assert_eq!(out[1].aggregate_magnitude_score, Some(0.0));
        assert_eq!(out[1].aggregate_score, Some(0.0));
    }

    #[test]
    fn ties_share_rank() {
        let regions = vec![
            region(100, vec![scores(6.0, 6.0), scores(6.0, 6.0)]),
            region(101, vec![scores(6.0, 6.0), scores(6.0, 6.0)]),
            region(102, vec![scores(1.0, 1.0), scores(1.0, 1.0)]),
        ];
        let out = aggregate(&factors(), &regions, date());
        assert_close(out[0].aggregate_rank_score, Some(10.0));
        assert_close(out[1].aggregate_rank_score, Some(10.0));
        assert_close(out[2].aggregate_rank_score, Some(10.0 / 3.0));
    }
}
