//! Per-level scoring of a metric snapshot.
//!
//! The same observations are grouped three times: once nationally, once
//! per city and once per district. Each grouping is scored independently,
//! so a sub-district's city rank is not derived from its national rank.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use jscore_region_models::{GroupScope, StatLevel};
use jscore_scoring_models::{
    CategoryId, GroupStatistics, MetricDefinition, Observation, ScoreRecord,
};

use crate::ScoringError;
use crate::group::GroupScorer;

/// The output of scoring one metric at one level.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelScores {
    /// The level that was scored.
    pub level: StatLevel,
    /// One entry per group, ordered by scope then category.
    pub groups: Vec<GroupStatistics>,
    /// One record per observation, in input order.
    pub records: Vec<ScoreRecord>,
}

fn check_ref_date(observations: &[Observation], ref_date: NaiveDate) -> Result<(), ScoringError> {
    match observations.iter().find(|o| o.ref_date != ref_date) {
        Some(o) => Err(ScoringError::ReferenceDateMismatch {
            sub_district: o.region.sub_district_id,
            found: o.ref_date,
            expected: ref_date,
        }),
        None => Ok(()),
    }
}

/// Scores every observation against its group at `level`.
///
/// # Errors
///
/// Returns [`ScoringError::ReferenceDateMismatch`] if any observation is
/// dated differently from `ref_date`.
pub fn score_level(
    metric: &MetricDefinition,
    level: StatLevel,
    ref_date: NaiveDate,
    observations: &[Observation],
) -> Result<LevelScores, ScoringError> {
    check_ref_date(observations, ref_date)?;

    let mut groups: BTreeMap<(GroupScope, CategoryId), Vec<usize>> = BTreeMap::new();
    for (idx, obs) in observations.iter().enumerate() {
        groups
            .entry((level.scope_of(&obs.region), obs.category_id))
            .or_default()
            .push(idx);
    }

    let mut stats = Vec::with_capacity(groups.len());
    let mut scored = Vec::with_capacity(observations.len());

    for ((scope, category_id), members) in groups {
        let scorer = GroupScorer::new(
            members.iter().map(|&i| observations[i].value),
            metric.outlier_limit,
        );

        log::debug!(
            "{} {level} {scope} {category_id}: {} members, {} scored, {} outliers",
            metric.id,
            members.len(),
            scorer.scored_len(),
            scorer.outliers().len(),
        );

        stats.push(GroupStatistics {
            metric: metric.id.clone(),
            scope,
            category_id,
            observations: members.len(),
            scored_values: scorer.scored_len(),
            outliers: scorer.outliers().len(),
            stat: *scorer.summary(),
            ref_date,
        });

        for idx in members {
            let obs = &observations[idx];
            scored.push((
                idx,
                ScoreRecord {
                    metric: metric.id.clone(),
                    level,
                    region: level.project(&obs.region),
                    category_id: obs.category_id,
                    value: obs.value,
                    scores: scorer.score(obs.value),
                    stat: *scorer.summary(),
                    ref_date,
                },
            ));
        }
    }

    scored.sort_by_key(|(idx, _)| *idx);

    Ok(LevelScores {
        level,
        groups: stats,
        records: scored.into_iter().map(|(_, record)| record).collect(),
    })
}

/// Scores a metric snapshot at every [`StatLevel`].
///
/// # Errors
///
/// Returns [`ScoringError`] if any level fails to score.
pub fn score_all_levels(
    metric: &MetricDefinition,
    ref_date: NaiveDate,
    observations: &[Observation],
) -> Result<Vec<LevelScores>, ScoringError> {
    StatLevel::ALL
        .iter()
        .map(|&level| score_level(metric, level, ref_date, observations))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_close;
    use jscore_region_models::{CityId, DistrictId, RegionPath, SubDistrictId};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    fn metric() -> MetricDefinition {
        MetricDefinition {
            id: "foot_traffic".to_string(),
            name: "Foot traffic".to_string(),
            description: String::new(),
            outlier_limit: 2,
            aggregate_category: CategoryId(0),
        }
    }

    fn obs(city: i64, district: i64, sub: i64, value: Option<f64>) -> Observation {
        Observation {
            region: RegionPath::new(city, district, sub),
            category_id: CategoryId(0),
            value,
            ref_date: date(),
        }
    }

    fn sample() -> Vec<Observation> {
        vec![
            obs(1, 10, 100, Some(50.0)),
            obs(1, 10, 101, Some(30.0)),
            obs(1, 11, 110, Some(10.0)),
            obs(2, 20, 200, Some(50.0)),
            obs(2, 20, 201, None),
        ]
    }

    fn record_for(scores: &LevelScores, sub: i64) -> &ScoreRecord {
        scores
            .records
            .iter()
            .find(|r| r.region.sub_district_id == SubDistrictId(sub))
            .unwrap()
    }

    #[test]
    fn nation_level_ranks_everyone_together() {
        let scores = score_level(&metric(), StatLevel::Nation, date(), &sample()).unwrap();
        assert_eq!(scores.groups.len(), 1);
        assert_eq!(scores.groups[0].observations, 5);
        assert_eq!(scores.groups[0].scored_values, 4);
        assert_close(record_for(&scores, 100).scores.rank_score, Some(10.0));
        assert_close(record_for(&scores, 200).scores.rank_score, Some(10.0));
        assert_close(record_for(&scores, 101).scores.rank_score, Some(5.0));
        assert_close(record_for(&scores, 110).scores.rank_score, Some(2.5));
        assert_eq!(record_for(&scores, 201).scores.rank_score, None);
    }

    #[test]
    fn city_level_ranks_within_city_and_drops_district() {
        let scores = score_level(&metric(), StatLevel::City, date(), &sample()).unwrap();
        assert_eq!(scores.groups.len(), 2);

        let r = record_for(&scores, 110);
        assert_eq!(r.region.city_id, Some(CityId(1)));
        assert_eq!(r.region.district_id, None);
        // 10 is third of three in city 1.
        assert_close(r.scores.rank_score, Some(10.0 / 3.0));
        assert_close(r.stat.max, Some(50.0));

        let alone = record_for(&scores, 200);
        assert_close(alone.scores.rank_score, Some(10.0));
    }

    #[test]
    fn district_level_drops_city() {
        let scores = score_level(&metric(), StatLevel::District, date(), &sample()).unwrap();
        assert_eq!(scores.groups.len(), 3);
        let r = record_for(&scores, 110);
        assert_eq!(r.region.city_id, None);
        assert_eq!(r.region.district_id, Some(DistrictId(11)));
        // Alone in district 11.
        assert_close(r.scores.rank_score, Some(10.0));
        assert_close(r.scores.magnitude_score, Some(10.0));
    }

    #[test]
    fn records_keep_input_order() {
        let input = sample();
        let scores = score_level(&metric(), StatLevel::District, date(), &input).unwrap();
        let ids: Vec<SubDistrictId> = scores
            .records
            .iter()
            .map(|r| r.region.sub_district_id)
            .collect();
        let expected: Vec<SubDistrictId> =
            input.iter().map(|o| o.region.sub_district_id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn group_with_only_nulls_gets_null_statistics() {
        let input = vec![obs(3, 30, 300, None), obs(3, 30, 301, Some(0.0))];
        let scores = score_level(&metric(), StatLevel::City, date(), &input).unwrap();
        assert!(scores.groups[0].stat.is_empty());
        assert!(
            scores
                .records
                .iter()
                .all(|r| r.scores == jscore_scoring_models::Scores::NULL)
        );
    }

    #[test]
    fn categories_are_separate_groups() {
        let mut input = sample();
        input.push(Observation {
            category_id: CategoryId(9),
            ..obs(1, 10, 100, Some(1.0))
        });
        let scores = score_level(&metric(), StatLevel::Nation, date(), &input).unwrap();
        assert_eq!(scores.groups.len(), 2);
        let other = scores
            .records
            .iter()
            .find(|r| r.category_id == CategoryId(9))
            .unwrap();
        assert_close(other.scores.rank_score, Some(10.0));
    }

    #[test]
    fn scoring_twice_is_identical() {
        let input = sample();
        let first = score_all_levels(&metric(), date(), &input).unwrap();
        let second = score_all_levels(&metric(), date(), &input).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        for (a, b) in first.iter().zip(&second) {
            for (ra, rb) in a.records.iter().zip(&b.records) {
                let bits = |r: &ScoreRecord| r.scores.composite_score.map(f64::to_bits);
                assert_eq!(bits(ra), bits(rb));
            }
        }
    }

    #[test]
    fn rejects_mixed_reference_dates() {
        let mut input = sample();
        input[2].ref_date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let err = score_level(&metric(), StatLevel::Nation, date(), &input).unwrap_err();
        assert_eq!(
            err,
            ScoringError::ReferenceDateMismatch {
                sub_district: SubDistrictId(110),
                found: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
                expected: date(),
            }
        );
    }
}
