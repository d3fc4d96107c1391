#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persistence for observations, scores and aggregates.
//!
//! [`ScoreStore`] is the seam between the batch orchestration and storage.
//! [`queries::PostgresStore`] implements it over `switchy_database` raw SQL
//! and [`memory::MemoryStore`] keeps everything in process for tests and dry
//! runs. Schema changes live in the workspace `migrations/` directory and are
//! applied by [`run_migrations`].

pub mod db;
pub mod memory;
pub mod queries;

use async_trait::async_trait;
use chrono::NaiveDate;
use include_dir::{Dir, include_dir};
use jscore_region_models::{GroupScope, RegionError, RegionTree, StatLevel};
use jscore_scoring_models::{
    AggregateScoreRecord, CategoryId, GroupStatistics, Observation, ScoreRecord,
};
use switchy_database::Database;
use switchy_schema::discovery::embedded::EmbeddedMigrationSource;
use switchy_schema::runner::MigrationRunner;

pub use memory::MemoryStore;
pub use queries::PostgresStore;

/// Embedded SQL migrations from the `migrations/` directory.
static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/../../migrations");

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] switchy_schema::MigrationError),

    /// Stored regions do not form a valid hierarchy.
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// The store refused the operation.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of what went wrong.
        message: String,
    },
}

/// Storage used by the batch scorer and aggregator.
///
/// Every `persist_*` call replaces the whole key set it names. Either the
/// new set is committed in full or the prior set is left untouched, so a
/// failed call can be retried as is.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Loads the region hierarchy.
    async fn fetch_regions(&self) -> Result<RegionTree, DbError>;

    /// Loads one metric's observations for every region in `scope`.
    ///
    /// Every region in scope is returned once per category observed for the
    /// metric on `ref_date`. Regions with no stored value come back with
    /// `value = None` instead of being omitted.
    async fn fetch_observations(
        &self,
        metric: &str,
        scope: GroupScope,
        ref_date: NaiveDate,
    ) -> Result<Vec<Observation>, DbError>;

    /// Loads the nation-level score records of one metric category.
    async fn fetch_prior_scores(
        &self,
        metric: &str,
        category_id: CategoryId,
        ref_date: NaiveDate,
    ) -> Result<Vec<ScoreRecord>, DbError>;

    /// Replaces the score records and group statistics of
    /// `(metric, level, ref_date)` in one commit.
    ///
    /// Returns the number of score records written.
    async fn persist_level_scores(
        &self,
        metric: &str,
        level: StatLevel,
        ref_date: NaiveDate,
        records: &[ScoreRecord],
        groups: &[GroupStatistics],
    ) -> Result<usize, DbError>;

    /// Replaces the aggregate records of `ref_date`.
    async fn persist_aggregate_records(
        &self,
        ref_date: NaiveDate,
        records: &[AggregateScoreRecord],
    ) -> Result<usize, DbError>;
}

/// Runs all pending database migrations.
///
/// # Errors
///
/// Returns [`DbError`] if any migration fails to apply.
pub async fn run_migrations(db: &dyn Database) -> Result<(), DbError> {
    let source = EmbeddedMigrationSource::new(&MIGRATIONS_DIR);
    let runner = MigrationRunner::new(Box::new(source));
    runner.run(db).await?;
    log::info!("Database migrations completed successfully");
    Ok(())
}
