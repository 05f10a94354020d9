//! Metadata collection loop.
//!
//! Each entity is `pending` until its title page has been fetched and
//! parsed, then `collected`. A failed attempt leaves the entity pending for
//! the next run; nothing is ever marked collected without its fields.
//!
//! # Checkpointing
//!
//! The whole table is rewritten every time `batch_size` entities have been
//! collected since the last write, and once more when the loop ends. A crash
//! loses at most one batch, whose entities are simply fetched again on the
//! next run.

use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use super::ids::IdCollector;
use super::{CollectError, EntityError, title_url};
use crate::config::MetadataConfig;
use crate::fetch::Fetch;
use crate::models::EntityTable;
use crate::progress::{read_table, write_table};
use crate::scrapers::title::movie_metadata;
use crate::storage::Storage;

/// Counters for one metadata run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRunReport {
    pub collected: usize,
    pub failed: usize,
    pub skipped: usize,
    pub checkpoints: usize,
    /// The per-run entity limit was reached before the table was exhausted.
    pub stopped_early: bool,
}

pub struct MetadataCollector<'a, F, S> {
    fetcher: &'a F,
    storage: &'a S,
    table_key: &'a str,
    config: &'a MetadataConfig,
}

impl<'a, F: Fetch, S: Storage> MetadataCollector<'a, F, S> {
    pub fn new(fetcher: &'a F, storage: &'a S, table_key: &'a str, config: &'a MetadataConfig) -> Self {
        Self {
            fetcher,
            storage,
            table_key,
            config,
        }
    }

    /// Load (or bootstrap) the progress table and collect all pending
    /// entities.
    #[instrument(level = "info", skip_all, fields(table = %self.table_key))]
    pub async fn run(&self) -> Result<MetadataRunReport, CollectError> {
        let table = self.load_or_bootstrap().await?;
        self.collect_pending(table).await
    }

    /// The stored table, or a freshly discovered one when none exists or
    /// `overwrite` is set. A fresh table is written before any metadata is
    /// fetched.
    async fn load_or_bootstrap(&self) -> Result<EntityTable, CollectError> {
        if !self.config.overwrite {
            if let Some(table) = read_table(self.storage, self.table_key).await? {
                return Ok(table);
            }
            info!("No progress table found; collecting identifiers");
        } else {
            info!("Overwrite requested; collecting identifiers from scratch");
        }

        let table = IdCollector::new(self.fetcher, self.config)?.collect().await;
        write_table(self.storage, self.table_key, &table).await?;
        info!(entities = table.len(), "Identifiers collected");
        Ok(table)
    }

    /// Walk the table in order, collecting every pending entity.
    pub async fn collect_pending(&self, mut table: EntityTable) -> Result<MetadataRunReport, CollectError> {
        let mut report = MetadataRunReport::default();
        let pending: Vec<String> = table
            .iter()
            .filter(|(_, record)| !record.metadata_collected)
            .map(|(id, _)| id.clone())
            .collect();
        report.skipped = table.len() - pending.len();
        info!(
            pending = pending.len(),
            skipped = report.skipped,
            "Collecting movie metadata"
        );

        let mut unflushed = 0usize;
        for id in pending {
            match self.fetch_metadata(&id).await {
                Ok(fields) => {
                    if let Some(record) = table.get_mut(&id) {
                        record.record_metadata(fields);
                    }
                    report.collected += 1;
                    unflushed += 1;
                    info!(movie_id = %id, "Collected metadata");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(movie_id = %id, error = %e, "Failed to collect metadata; will retry next run");
                }
            }

            if unflushed >= self.config.batch_size {
                self.checkpoint(&table, &mut report).await?;
                unflushed = 0;
            }

            sleep(self.config.entity_sleep()).await;

            if self
                .config
                .max_entities_per_run
                .is_some_and(|limit| report.collected >= limit)
            {
                info!(collected = report.collected, "Reached per-run entity limit");
                report.stopped_early = true;
                break;
            }
        }

        if unflushed > 0 {
            self.checkpoint(&table, &mut report).await?;
        }

        info!(
            collected = report.collected,
            failed = report.failed,
            checkpoints = report.checkpoints,
            "Metadata run finished"
        );
        Ok(report)
    }

    async fn fetch_metadata(&self, id: &str) -> Result<Map<String, Value>, EntityError> {
        let url = title_url(id);
        let page = self.fetcher.get(&url, &[]).await?;
        if !page.is_success() {
            return Err(EntityError::Status {
                url: page.url,
                status: page.status,
            });
        }
        Ok(movie_metadata(&page.body).into_fields())
    }

    async fn checkpoint(&self, table: &EntityTable, report: &mut MetadataRunReport) -> Result<(), CollectError> {
        write_table(self.storage, self.table_key, table).await?;
        report.checkpoints += 1;
        info!(checkpoint = report.checkpoints, "Progress table checkpointed");
        Ok(())
    }
}
