//! # IMDb Harvest
//!
//! An incremental, resumable scraper for IMDb feature films. It discovers
//! title ids through the genre-partitioned search listing, collects title
//! metadata, and walks each title's review feed, persisting reviews as
//! numbered gzip-compressed CSV partitions.
//!
//! ## Features
//!
//! - Durable progress table: a killed run resumes where it stopped, losing at
//!   most one checkpoint batch
//! - Coverage control by percentage or absolute count, per genre and per title
//! - Retry with randomized waits on transient network failures
//! - Local directory or HTTP object store backends
//!
//! ## Usage
//!
//! ```sh
//! imdb_harvest --config config.yaml --entity metadata
//! imdb_harvest --config config.yaml --entity reviews
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: walk the search listing of every configured genre and
//!    build the progress table (first run or overwrite only)
//! 2. **Metadata**: fetch and parse the title page of every pending title,
//!    checkpointing the table every batch
//! 3. **Reviews**: page through the review feed of every title with metadata
//!    and flush the results as partitions

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod collect;
mod config;
mod fetch;
mod models;
mod outputs;
mod progress;
mod scrapers;
mod storage;
#[cfg(test)]
mod testing;
mod utils;

use cli::{Cli, Entity};
use collect::metadata::MetadataCollector;
use collect::reviews::{OutputMode, ReviewCollector, ReviewOutcome};
use config::{Config, ConfigError};
use fetch::{HttpFetcher, RetryFetch};
use storage::Backend;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // Configuration errors are fatal before any network activity.
    let config = load_config(&args)?;

    let start_time = std::time::Instant::now();
    info!(entity = ?args.entity, config = %args.config, "imdb_harvest starting up");
    debug!(table_key = %config.table_key, partition_prefix = %config.partition_prefix, "Loaded configuration");

    if let Err(e) = run(&args, &config).await {
        error!(error = %e, "Run failed");
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

/// Load the config and start tracing at its log level. A config that cannot
/// be loaded is still reported through tracing, at the default level.
fn load_config(args: &Cli) -> Result<Config, ConfigError> {
    match Config::load(&args.config) {
        Ok(config) => {
            init_tracing(&config.log_level);
            Ok(config.with_storage_token(args.storage_token.clone()))
        }
        Err(e) => {
            init_tracing("info");
            error!(config = %args.config, error = %e, "Could not load configuration");
            Err(e)
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Only fails when a subscriber is already installed.
    let _ = tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .try_init();
}

/// Build the fetcher and storage backend, then run the selected phase.
async fn run(args: &Cli, config: &Config) -> Result<(), Box<dyn Error>> {
    let fetcher = RetryFetch::from_config(HttpFetcher::new(config.http.timeout())?, &config.http);
    let storage = Backend::from_config(&config.storage, &config.http)?;

    match args.entity {
        Entity::Metadata => {
            let report = MetadataCollector::new(&fetcher, &storage, &config.table_key, &config.metadata)
                .run()
                .await?;
            info!(
                collected = report.collected,
                failed = report.failed,
                skipped = report.skipped,
                checkpoints = report.checkpoints,
                stopped_early = report.stopped_early,
                "Metadata collection complete"
            );
        }
        Entity::Reviews => {
            let outcome = ReviewCollector::new(
                &fetcher,
                &storage,
                &config.table_key,
                &config.partition_prefix,
                &config.reviews,
            )
            .run(OutputMode::Persist)
            .await?;
            if let ReviewOutcome::Persisted(report) = outcome {
                info!(
                    partitions = report.partitions,
                    reviews = report.reviews,
                    entities = report.entities,
                    failed = report.failed,
                    "Review collection complete"
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn args(config: &str) -> Cli {
        Cli::parse_from(["imdb_harvest", "--config", config, "--entity", "metadata"])
    }

    #[test]
    fn test_unreadable_config_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.yaml");
        let path = path.to_str().unwrap();

        let err = load_config(&args(path)).unwrap_err();

        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("missing.yaml"));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "storage:\n  backend: local\n  root: ./data\nmetadata:\n  genres: [war]\n  pct_titles: 1\nreviews:\n  pct_reviews: 10\nhttp:\n  timeout_secs: 0\n",
        )
        .unwrap();

        let err = load_config(&args(path.to_str().unwrap())).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("timeout_secs")));
    }

    #[test]
    fn test_loaded_config_carries_the_storage_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "storage:\n  backend: http\n  base_url: https://store.example.com\nmetadata:\n  genres: [war]\n  pct_titles: 1\nreviews:\n  pct_reviews: 10\n",
        )
        .unwrap();
        let mut args = args(path.to_str().unwrap());
        args.storage_token = Some("secret".into());

        let config = load_config(&args).unwrap();

        assert!(matches!(
            config.storage,
            StorageConfig::Http { token: Some(ref t), .. } if t == "secret"
        ));
    }
}
