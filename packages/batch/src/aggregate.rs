//! The weighted aggregate unit.
//!
//! Nation-level scores of every weighted factor are fetched concurrently and
//! joined before anything is combined: re-ranking and re-normalization need
//! every region's averaged value. A factor whose fetch fails contributes
//! nothing, which nulls the aggregate of every region.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use futures::StreamExt as _;
use futures::stream;
use jscore_database::ScoreStore;
use jscore_region_models::SubDistrictId;
use jscore_scoring::RegionFactors;
use jscore_scoring_models::{FactorScores, WeightedFactor};

use crate::retry::with_retry;
use crate::{BatchError, BatchOptions, ProgressCallback, Unit, UnitOutcome};

type FactorMap = BTreeMap<SubDistrictId, FactorScores>;

async fn fetch_factor(
    store: &dyn ScoreStore,
    factor: &WeightedFactor,
    ref_date: NaiveDate,
    options: &BatchOptions,
) -> Result<FactorMap, BatchError> {
    let metric = jscore_metrics::find_metric(&factor.metric_name).ok_or_else(|| {
        BatchError::UnknownMetric {
            metric: factor.metric_name.clone(),
        }
    })?;
    let id = metric.id.as_str();
    let category_id = metric.aggregate_category;

    let what = format!("fetching {id} scores");
    let records = with_retry(options, &what, || async move {
        store.fetch_prior_scores(id, category_id, ref_date).await
    })
    .await
    .result?;

    Ok(records
        .iter()
        .map(|r| (r.region.sub_district_id, FactorScores::from(r)))
        .collect())
}

/// Runs the weighted aggregate for `ref_date` and persists one record per
/// sub-district.
pub async fn aggregate(
    store: &dyn ScoreStore,
    factors: &[WeightedFactor],
    ref_date: NaiveDate,
    options: &BatchOptions,
    progress: &dyn ProgressCallback,
) -> UnitOutcome {
    let outcome = |attempts, result| UnitOutcome {
        unit: Unit::Aggregate,
        ref_date,
        attempts,
        result,
    };

    let regions = with_retry(options, "fetching regions", || store.fetch_regions()).await;
    let tree = match regions.result {
        Ok(tree) => tree,
        Err(e) => return outcome(regions.attempts, Err(e.into())),
    };

    #[allow(clippy::cast_possible_truncation)]
    progress.set_total(factors.len() as u64 + 1);

    let mut fetched: Vec<(usize, Result<FactorMap, BatchError>)> =
        stream::iter(factors.iter().enumerate().map(|(idx, factor)| async move {
            let result = fetch_factor(store, factor, ref_date, options).await;
            progress.set_message(factor.metric_name.clone());
            progress.inc(1);
            (idx, result)
        }))
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;
    fetched.sort_by_key(|(idx, _)| *idx);

    let mut maps = Vec::with_capacity(factors.len());
    for ((_, result), factor) in fetched.into_iter().zip(factors) {
        match result {
            Ok(map) => {
                if map.is_empty() {
                    log::warn!("{} has no scores on {ref_date}", factor.metric_name);
                }
                maps.push(map);
            }
            Err(BatchError::UnknownMetric { metric }) => {
                return outcome(0, Err(BatchError::UnknownMetric { metric }));
            }
            Err(e) => {
                log::warn!(
                    "{} scores unavailable, its aggregates will be null: {e}",
                    factor.metric_name
                );
                maps.push(FactorMap::new());
            }
        }
    }

    let regions: Vec<RegionFactors> = tree
        .sub_district_paths()
        .into_iter()
        .map(|path| RegionFactors {
            region: path,
            factors: maps
                .iter()
                .map(|m| m.get(&path.sub_district_id).copied())
                .collect(),
        })
        .collect();

    let records = jscore_scoring::aggregate(factors, &regions, ref_date);
    let records = records.as_slice();

    let persisted = with_retry(options, "persisting aggregates", || async move {
        store.persist_aggregate_records(ref_date, records).await
    })
    .await;

    if let Ok(written) = &persisted.result {
        log::info!("Aggregated {written} sub-districts for {ref_date}");
    }
    progress.inc(1);

    outcome(persisted.attempts, persisted.result.map_err(BatchError::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use crate::score_metrics;
    use crate::test_utils::{date, metric, options, store};
    use jscore_database::memory::FailTarget;
    use jscore_region_models::StatLevel;

    fn factors() -> Vec<WeightedFactor> {
        vec![
            WeightedFactor {
                metric_name: "sales".to_string(),
                weight: 1.5,
            },
            WeightedFactor {
                metric_name: "income".to_string(),
                weight: 1.5,
            },
        ]
    }

    #[tokio::test]
    async fn aggregates_every_region() {
        let store = store(&["sales", "income"]);
        let report = score_metrics(
            &store,
            &[metric("sales"), metric("income")],
            date(),
            &options(),
            &NullProgress,
        )
        .await;
        assert!(report.is_success());

        let outcome = aggregate(&store, &factors(), date(), &options(), &NullProgress).await;
        assert_eq!(outcome.result.unwrap(), 4);

        let records = store.aggregate_records(date());
        assert_eq!(records.len(), 4);
        let best = records
            .iter()
            .find(|r| r.region.sub_district_id == SubDistrictId(100))
            .unwrap();
        assert_eq!(best.aggregate_rank_score, Some(10.0));
        assert_eq!(best.aggregate_magnitude_score, Some(10.0));
        assert!(records.iter().all(|r| r.aggregate_score.is_some()));
    }

    #[tokio::test]
    async fn missing_factor_nulls_only_affected_regions() {
        let store = store(&["sales", "income"]);
        score_metrics(
            &store,
            &[metric("sales"), metric("income")],
            date(),
            &options(),
            &NullProgress,
        )
        .await;

        // Re-score income without sub-district 101.
        let mut nation = store.score_records("income", StatLevel::Nation, date());
        nation.retain(|r| r.region.sub_district_id != SubDistrictId(101));
        let groups = store.group_statistics("income", StatLevel::Nation, date());
        store
            .persist_level_scores("income", StatLevel::Nation, date(), &nation, &groups)
            .await
            .unwrap();

        aggregate(&store, &factors(), date(), &options(), &NullProgress)
            .await
            .result
            .unwrap();

        let records = store.aggregate_records(date());
        assert_eq!(records.len(), 4);
        for record in &records {
            if record.region.sub_district_id == SubDistrictId(101) {
                assert_eq!(record.aggregate_score, None);
                assert_eq!(record.aggregate_rank_score, None);
            } else {
                assert!(record.aggregate_score.is_some());
            }
        }
    }

    #[tokio::test]
    async fn failed_factor_fetch_yields_null_aggregates() {
        let store = store(&["sales", "income"]);
        score_metrics(
            &store,
            &[metric("sales"), metric("income")],
            date(),
            &options(),
            &NullProgress,
        )
        .await;
        store.fail(
            FailTarget::Fetch {
                metric: "income".to_string(),
            },
            None,
        );

        let outcome = aggregate(&store, &factors(), date(), &options(), &NullProgress).await;
        assert!(outcome.is_success());
        let records = store.aggregate_records(date());
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.aggregate_score.is_none()));
    }

    #[tokio::test]
    async fn unknown_factor_fails_the_unit() {
        let store = store(&[]);
        let factors = vec![WeightedFactor {
            metric_name: "nonexistent".to_string(),
            weight: 1.0,
        }];
        let outcome = aggregate(&store, &factors, date(), &options(), &NullProgress).await;
        assert!(matches!(outcome.result, Err(BatchError::UnknownMetric { .. })));
        assert!(store.aggregate_records(date()).is_empty());
    }

    #[tokio::test]
    async fn persist_failure_is_retried() {
        let store = store(&["sales", "income"]);
        score_metrics(
            &store,
            &[metric("sales"), metric("income")],
            date(),
            &options(),
            &NullProgress,
        )
        .await;
        store.fail(FailTarget::Aggregates, Some(1));

        let outcome = aggregate(&store, &factors(), date(), &options(), &NullProgress).await;
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.is_success());
        assert_eq!(store.aggregate_records(date()).len(), 4);
    }
}
