//! Postgres implementation of [`ScoreStore`].
//!
//! All statements are raw SQL through `query_raw_params()` and
//! `exec_raw_params()`. Dates travel as `YYYY-MM-DD` text and are cast in
//! SQL, and are read back the same way.

use async_trait::async_trait;
use chrono::NaiveDate;
use jscore_region_models::{
    CityId, DistrictId, GroupScope, RegionPath, RegionTree, ScopedRegion, StatLevel,
    SubDistrictId,
};
use jscore_scoring_models::{
    AggregateScoreRecord, CategoryId, GroupStatistics, Observation, ScoreRecord, Scores,
    StatisticsSummary,
};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue};

use crate::{DbError, ScoreStore};

/// Reads a column, mapping parse failures to [`DbError::Conversion`].
macro_rules! column {
    ($row:expr, $name:literal) => {
        $row.to_value($name).map_err(|e| DbError::Conversion {
            message: format!("Failed to parse {}: {e}", $name),
        })?
    };
}

const SCORE_COLUMNS: &str = "metric, level, ref_date::text AS ref_date, city_id, district_id,
    sub_district_id, category_id, value, rank_score, magnitude_score, composite_score,
    magnitude_score_trimmed, composite_score_trimmed, stat_average, stat_median, stat_stddev,
    stat_max, stat_min";

/// A [`ScoreStore`] backed by a Postgres connection.
pub struct PostgresStore {
    db: Box<dyn Database>,
}

impl PostgresStore {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(db: Box<dyn Database>) -> Self {
        Self { db }
    }

    /// The underlying connection.
    #[must_use]
    pub fn database(&self) -> &dyn Database {
        self.db.as_ref()
    }
}

fn date_param(date: NaiveDate) -> DatabaseValue {
    DatabaseValue::String(date.format("%Y-%m-%d").to_string())
}

fn real(value: Option<f64>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, DatabaseValue::Real64)
}

fn count(value: usize, what: &str) -> Result<DatabaseValue, DbError> {
    i32::try_from(value)
        .map(DatabaseValue::Int32)
        .map_err(|e| DbError::Conversion {
            message: format!("{what} count {value} does not fit a column: {e}"),
        })
}

fn parse_date(value: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| DbError::Conversion {
        message: format!("Invalid date '{value}': {e}"),
    })
}

/// Key of a group scope in `score_statistics`: `0` for the nation,
/// otherwise the city or district id.
const fn scope_id(scope: GroupScope) -> i64 {
    match scope {
        GroupScope::Nation => 0,
        GroupScope::City(id) => id.value(),
        GroupScope::District(id) => id.value(),
    }
}

fn row_to_score_record(row: &switchy_database::Row) -> Result<ScoreRecord, DbError> {
    let level: String = column!(row, "level");
    let level = level.parse::<StatLevel>().map_err(|e| DbError::Conversion {
        message: format!("Unknown level '{level}': {e}"),
    })?;
    let ref_date: String = column!(row, "ref_date");
    let city_id: Option<i64> = column!(row, "city_id");
    let district_id: Option<i64> = column!(row, "district_id");

    Ok(ScoreRecord {
        metric: column!(row, "metric"),
        level,
        region: ScopedRegion {
            city_id: city_id.map(CityId),
            district_id: district_id.map(DistrictId),
            sub_district_id: SubDistrictId(column!(row, "sub_district_id")),
        },
        category_id: CategoryId(column!(row, "category_id")),
        value: column!(row, "value"),
        scores: Scores {
            rank_score: column!(row, "rank_score"),
            magnitude_score: column!(row, "magnitude_score"),
            composite_score: column!(row, "composite_score"),
            magnitude_score_trimmed: column!(row, "magnitude_score_trimmed"),
            composite_score_trimmed: column!(row, "composite_score_trimmed"),
        },
        stat: StatisticsSummary {
            average: column!(row, "stat_average"),
            median: column!(row, "stat_median"),
            stddev: column!(row, "stat_stddev"),
            max: column!(row, "stat_max"),
            min: column!(row, "stat_min"),
        },
        ref_date: parse_date(&ref_date)?,
    })
}

async fn replace_score_records(
    db: &dyn Database,
    metric: &str,
    level: StatLevel,
    ref_date: NaiveDate,
    records: &[ScoreRecord],
) -> Result<usize, DbError> {
    db.exec_raw_params(
        "DELETE FROM score_records
         WHERE metric = $1 AND level = $2 AND ref_date = $3::text::date",
        &[
            DatabaseValue::String(metric.to_string()),
            DatabaseValue::String(level.as_ref().to_string()),
            date_param(ref_date),
        ],
    )
    .await?;

    for record in records {
        db.exec_raw_params(
            "INSERT INTO score_records (
                metric, level, ref_date, city_id, district_id, sub_district_id,
                category_id, value, rank_score, magnitude_score, composite_score,
                magnitude_score_trimmed, composite_score_trimmed, stat_average,
                stat_median, stat_stddev, stat_max, stat_min
            ) VALUES (
                $1, $2, $3::text::date, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18
            )",
            &[
                DatabaseValue::String(record.metric.clone()),
                DatabaseValue::String(record.level.as_ref().to_string()),
                date_param(record.ref_date),
                record
                    .region
                    .city_id
                    .map_or(DatabaseValue::Null, |id| DatabaseValue::Int64(id.value())),
                record
                    .region
                    .district_id
                    .map_or(DatabaseValue::Null, |id| DatabaseValue::Int64(id.value())),
                DatabaseValue::Int64(record.region.sub_district_id.value()),
                DatabaseValue::Int64(record.category_id.0),
                real(record.value),
                real(record.scores.rank_score),
                real(record.scores.magnitude_score),
                real(record.scores.composite_score),
                real(record.scores.magnitude_score_trimmed),
                real(record.scores.composite_score_trimmed),
                real(record.stat.average),
                real(record.stat.median),
                real(record.stat.stddev),
                real(record.stat.max),
                real(record.stat.min),
            ],
        )
        .await?;
    }

    Ok(records.len())
}

async fn replace_group_statistics(
    db: &dyn Database,
    metric: &str,
    level: StatLevel,
    ref_date: NaiveDate,
    groups: &[GroupStatistics],
) -> Result<usize, DbError> {
    db.exec_raw_params(
        "DELETE FROM score_statistics
         WHERE metric = $1 AND level = $2 AND ref_date = $3::text::date",
        &[
            DatabaseValue::String(metric.to_string()),
            DatabaseValue::String(level.as_ref().to_string()),
            date_param(ref_date),
        ],
    )
    .await?;

    for group in groups {
        db.exec_raw_params(
            "INSERT INTO score_statistics (
                metric, level, ref_date, scope_id, category_id, observations,
                scored_values, outliers, stat_average, stat_median, stat_stddev,
                stat_max, stat_min
            ) VALUES ($1, $2, $3::text::date, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            &[
                DatabaseValue::String(group.metric.clone()),
                DatabaseValue::String(group.level().as_ref().to_string()),
                date_param(group.ref_date),
                DatabaseValue::Int64(scope_id(group.scope)),
                DatabaseValue::Int64(group.category_id.0),
                count(group.observations, "observation")?,
                count(group.scored_values, "scored value")?,
                count(group.outliers, "outlier")?,
                real(group.stat.average),
                real(group.stat.median),
                real(group.stat.stddev),
                real(group.stat.max),
                real(group.stat.min),
            ],
        )
        .await?;
    }

    Ok(groups.len())
}

async fn replace_aggregate_records(
    db: &dyn Database,
    ref_date: NaiveDate,
    records: &[AggregateScoreRecord],
) -> Result<usize, DbError> {
    db.exec_raw_params(
        "DELETE FROM aggregate_scores WHERE ref_date = $1::text::date",
        &[date_param(ref_date)],
    )
    .await?;

    for record in records {
        db.exec_raw_params(
            "INSERT INTO aggregate_scores (
                ref_date, city_id, district_id, sub_district_id,
                aggregate_rank_score, aggregate_magnitude_score, aggregate_score,
                aggregate_magnitude_score_trimmed, aggregate_score_trimmed
            ) VALUES ($1::text::date, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                date_param(record.ref_date),
                DatabaseValue::Int64(record.region.city_id.value()),
                DatabaseValue::Int64(record.region.district_id.value()),
                DatabaseValue::Int64(record.region.sub_district_id.value()),
                real(record.aggregate_rank_score),
                real(record.aggregate_magnitude_score),
                real(record.aggregate_score),
                real(record.aggregate_magnitude_score_trimmed),
                real(record.aggregate_score_trimmed),
            ],
        )
        .await?;
    }

    Ok(records.len())
}

/// Commits `txn` if `result` succeeded and rolls it back otherwise.
macro_rules! finish_transaction {
    ($txn:expr, $result:expr) => {
        match $result {
            Ok(written) => {
                $txn.commit().await?;
                Ok(written)
            }
            Err(e) => {
                if let Err(rollback) = $txn.rollback().await {
                    log::warn!("Rollback failed after {e}: {rollback}");
                }
                Err(e)
            }
        }
    };
}

#[async_trait]
impl ScoreStore for PostgresStore {
    async fn fetch_regions(&self) -> Result<RegionTree, DbError> {
        let rows = self
            .db
            .query_raw_params(
                "SELECT city_id, district_id, sub_district_id,
                        city_name, district_name, sub_district_name
                 FROM regions
                 ORDER BY city_id, district_id, sub_district_id",
                &[],
            )
            .await?;

        let mut tree = RegionTree::new();
        for row in &rows {
            let city_name: String = column!(row, "city_name");
            let district_name: String = column!(row, "district_name");
            let sub_district_name: String = column!(row, "sub_district_name");
            let path = RegionPath::new(
                column!(row, "city_id"),
                column!(row, "district_id"),
                column!(row, "sub_district_id"),
            );
            tree.insert_named_path(path, &city_name, &district_name, &sub_district_name)?;
        }

        log::info!(
            "Loaded {} cities, {} districts, {} sub-districts",
            tree.city_count(),
            tree.district_count(),
            rows.len()
        );

        Ok(tree)
    }

    async fn fetch_observations(
        &self,
        metric: &str,
        scope: GroupScope,
        ref_date: NaiveDate,
    ) -> Result<Vec<Observation>, DbError> {
        let mut params = vec![DatabaseValue::String(metric.to_string()), date_param(ref_date)];
        let filter = match scope {
            GroupScope::Nation => "TRUE",
            GroupScope::City(id) => {
                params.push(DatabaseValue::Int64(id.value()));
                "r.city_id = $3"
            }
            GroupScope::District(id) => {
                params.push(DatabaseValue::Int64(id.value()));
                "r.district_id = $3"
            }
        };

        // Every region in scope appears once per observed category, with a
        // null value where nothing was recorded.
        let sql = format!(
            "SELECT r.city_id, r.district_id, r.sub_district_id, c.category_id, o.value
             FROM regions r
             CROSS JOIN (
                 SELECT DISTINCT category_id FROM observations
                 WHERE metric = $1 AND ref_date = $2::text::date
             ) c
             LEFT JOIN observations o
                 ON o.metric = $1
                 AND o.ref_date = $2::text::date
                 AND o.category_id = c.category_id
                 AND o.sub_district_id = r.sub_district_id
             WHERE {filter}
             ORDER BY c.category_id, r.sub_district_id"
        );

        let rows = self.db.query_raw_params(&sql, &params).await?;

        let mut observations = Vec::with_capacity(rows.len());
        for row in &rows {
            observations.push(Observation {
                region: RegionPath::new(
                    column!(row, "city_id"),
                    column!(row, "district_id"),
                    column!(row, "sub_district_id"),
                ),
                category_id: CategoryId(column!(row, "category_id")),
                value: column!(row, "value"),
                ref_date,
            });
        }

        log::debug!(
            "Fetched {} {metric} observations for {scope} on {ref_date}",
            observations.len()
        );

        Ok(observations)
    }

    async fn fetch_prior_scores(
        &self,
        metric: &str,
        category_id: CategoryId,
        ref_date: NaiveDate,
    ) -> Result<Vec<ScoreRecord>, DbError> {
        let sql = format!(
            "SELECT {SCORE_COLUMNS} FROM score_records
             WHERE metric = $1 AND level = $2 AND category_id = $3 AND ref_date = $4::text::date
             ORDER BY sub_district_id"
        );
        let rows = self
            .db
            .query_raw_params(
                &sql,
                &[
                    DatabaseValue::String(metric.to_string()),
                    DatabaseValue::String(StatLevel::Nation.as_ref().to_string()),
                    DatabaseValue::Int64(category_id.0),
                    date_param(ref_date),
                ],
            )
            .await?;

        rows.iter().map(row_to_score_record).collect()
    }

    async fn persist_level_scores(
        &self,
        metric: &str,
        level: StatLevel,
        ref_date: NaiveDate,
        records: &[ScoreRecord],
        groups: &[GroupStatistics],
    ) -> Result<usize, DbError> {
        let txn = self.db.begin_transaction().await?;
        let result = async {
            let written =
                replace_score_records(txn.as_ref(), metric, level, ref_date, records).await?;
            replace_group_statistics(txn.as_ref(), metric, level, ref_date, groups).await?;
            Ok::<_, DbError>(written)
        }
        .await;
        finish_transaction!(txn, result)
    }

    async fn persist_aggregate_records(
        &self,
        ref_date: NaiveDate,
        records: &[AggregateScoreRecord],
    ) -> Result<usize, DbError> {
        let txn = self.db.begin_transaction().await?;
        let result = replace_aggregate_records(txn.as_ref(), ref_date, records).await;
        finish_transaction!(txn, result)
    }
}
