#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for J-Score scoring and aggregation runs.
//!
//! Uses `indicatif-log-bridge` (via [`jscore_cli_utils::init_logger`]) so
//! log lines and progress bars never fight for the terminal.

use std::time::Instant;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use jscore_batch::{BatchOptions, BatchReport, ProgressCallback as _};
use jscore_cli_utils::{IndicatifProgress, MultiProgress};
use jscore_database::{PostgresStore, db, run_migrations};
use jscore_metrics::{all_metrics, enabled_metrics, weighted_factors};

#[derive(Parser)]
#[command(name = "jscore", about = "Location scoring and weighted aggregation")]
struct Cli {
    /// Units or fetches in flight (overrides `JSCORE_CONCURRENCY`)
    #[arg(long, global = true)]
    concurrency: Option<usize>,
    /// Attempts per unit before it fails (overrides `JSCORE_MAX_ATTEMPTS`)
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// List registered metrics and aggregate weights
    Metrics,
    /// Score metrics at the nation, city and district levels
    Score {
        /// Reference date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
        /// Comma-separated list of metric IDs (overrides `JSCORE_METRICS` env var)
        #[arg(long)]
        metrics: Option<String>,
    },
    /// Combine nation-level scores into the weighted aggregate
    Aggregate {
        /// Reference date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },
    /// Score metrics, then aggregate
    Run {
        /// Reference date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
        /// Comma-separated list of metric IDs (overrides `JSCORE_METRICS` env var)
        #[arg(long)]
        metrics: Option<String>,
    },
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got '{value}': {e}"))
}

async fn connect() -> Result<PostgresStore, Box<dyn std::error::Error>> {
    let db = db::connect_from_env().await?;
    Ok(PostgresStore::new(db))
}

async fn score(
    store: &PostgresStore,
    multi: &MultiProgress,
    ref_date: NaiveDate,
    filter: Option<String>,
    options: &BatchOptions,
) -> Result<BatchReport, Box<dyn std::error::Error>> {
    let metrics = enabled_metrics(filter);
    if metrics.is_empty() {
        return Err("no metrics selected".into());
    }

    log::info!(
        "Scoring {} metrics for {ref_date} (concurrency {}, {} attempts)",
        metrics.len(),
        options.concurrency,
        options.max_attempts
    );

    let progress = IndicatifProgress::units_bar(multi, "Scoring");
    let report =
        jscore_batch::score_metrics(store, &metrics, ref_date, options, progress.as_ref()).await;
    progress.finish(format!("{} units", report.outcomes.len()));

    Ok(report)
}

async fn aggregate(
    store: &PostgresStore,
    multi: &MultiProgress,
    ref_date: NaiveDate,
    options: &BatchOptions,
) -> BatchReport {
    let factors = weighted_factors();
    log::info!("Aggregating {} factors for {ref_date}", factors.len());

    let progress = IndicatifProgress::units_bar(multi, "Aggregating");
    let outcome =
        jscore_batch::aggregate(store, &factors, ref_date, options, progress.as_ref()).await;
    progress.finish("done".to_string());

    let mut report = BatchReport::new(ref_date);
    report.outcomes.push(outcome);
    report
}

fn finish(report: &BatchReport, started: Instant) -> Result<(), Box<dyn std::error::Error>> {
    report.log_summary();
    log::info!("Finished in {:.1}s", started.elapsed().as_secs_f64());

    let failed = report.failed().count();
    if failed > 0 {
        return Err(format!("{failed} of {} units failed", report.outcomes.len()).into());
    }
    Ok(())
}

fn print_metrics() {
    let metrics = all_metrics();
    println!("{:<18} {:<28} {:>2} {:>8}", "ID", "NAME", "K", "CATEGORY");
    println!("{}", "-".repeat(60));
    for metric in &metrics {
        println!(
            "{:<18} {:<28} {:>2} {:>8}",
            metric.id(),
            metric.name(),
            metric.outlier_limit,
            metric.aggregate_category.0
        );
    }

    println!();
    println!("{:<18} WEIGHT", "FACTOR");
    println!("{}", "-".repeat(26));
    for factor in &weighted_factors() {
        println!("{:<18} {:.2}", factor.metric_name, factor.weight);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = jscore_cli_utils::init_logger();
    let cli = Cli::parse();

    let options = BatchOptions::from_env()
        .with_concurrency(cli.concurrency)
        .with_max_attempts(cli.max_attempts);

    match cli.command {
        Commands::Migrate => {
            log::info!("Running database migrations...");
            let db = db::connect_from_env().await?;
            run_migrations(db.as_ref()).await?;
            log::info!("Migrations complete.");
        }
        Commands::Metrics => print_metrics(),
        Commands::Score { date, metrics } => {
            let started = Instant::now();
            let store = connect().await?;
            let report = score(&store, &multi, date, metrics, &options).await?;
            finish(&report, started)?;
        }
        Commands::Aggregate { date } => {
            let started = Instant::now();
            let store = connect().await?;
            let report = aggregate(&store, &multi, date, &options).await;
            finish(&report, started)?;
        }
        Commands::Run { date, metrics } => {
            let started = Instant::now();
            let store = connect().await?;
            let mut report = score(&store, &multi, date, metrics, &options).await?;
            if !report.is_success() {
                log::warn!("Some scoring units failed; their metrics keep the previous scores");
            }
            report.extend(aggregate(&store, &multi, date, &options).await);
            finish(&report, started)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory as _;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_global_overrides() {
        let cli = Cli::try_parse_from([
            "jscore",
            "run",
            "--date",
            "2024-06-30",
            "--metrics",
            "sales,income",
            "--concurrency",
            "8",
        ])
        .unwrap();
        assert_eq!(cli.concurrency, Some(8));
        assert_eq!(cli.max_attempts, None);
        match cli.command {
            Commands::Run { date, metrics } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
                assert_eq!(metrics.as_deref(), Some("sales,income"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(Cli::try_parse_from(["jscore", "aggregate", "--date", "30/06/2024"]).is_err());
    }
}
