//! Review collection loop with partitioned output.
//!
//! Reviews of consecutive entities accumulate in one in-memory buffer. Once
//! the buffer holds at least `partition_size` review records the progress
//! table is flushed first, then the buffer is written as the next numbered
//! partition. Anything left in the buffer when the table is exhausted forms
//! the last partition.
//!
//! A crash between flushes loses the buffered reviews while their entities
//! are still recorded as pending, so the next run collects them again.

use rand::rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, instrument, warn};

use super::CollectError;
use super::review_pages::ReviewPager;
use crate::config::ReviewsConfig;
use crate::fetch::Fetch;
use crate::models::{EntityTable, ReviewRecord};
use crate::outputs::partition::{self, partition_key};
use crate::progress::{read_table, write_table};
use crate::storage::Storage;

/// Where a full partition goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Flush the table and write numbered partition objects.
    #[default]
    Persist,
    /// Hand the first full partition back to the caller; nothing is written.
    ReturnResults,
}

/// Counters for one persisted review run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewRunReport {
    pub partitions: usize,
    pub reviews: usize,
    pub entities: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Persisted(ReviewRunReport),
    Returned(Vec<ReviewRecord>),
}

pub struct ReviewCollector<'a, F, S> {
    fetcher: &'a F,
    storage: &'a S,
    table_key: &'a str,
    partition_prefix: &'a str,
    config: &'a ReviewsConfig,
}

/// Mutable state of one run: the partition buffer and its bookkeeping.
struct PartitionBuffer {
    reviews: Vec<ReviewRecord>,
    next_partition: usize,
    /// Partitions of earlier runs are skipped rather than overwritten.
    keep_existing: bool,
    table_dirty: bool,
}

impl<'a, F: Fetch, S: Storage> ReviewCollector<'a, F, S> {
    pub fn new(
        fetcher: &'a F,
        storage: &'a S,
        table_key: &'a str,
        partition_prefix: &'a str,
        config: &'a ReviewsConfig,
    ) -> Self {
        Self {
            fetcher,
            storage,
            table_key,
            partition_prefix,
            config,
        }
    }

    /// Collect reviews of every entity with metadata but without reviews.
    ///
    /// # Errors
    ///
    /// [`CollectError::MissingTable`] when no progress table exists, and any
    /// storage error while flushing. Failures of single entities are logged
    /// and leave the entity pending.
    #[instrument(level = "info", skip_all, fields(table = %self.table_key, ?mode))]
    pub async fn run(&self, mode: OutputMode) -> Result<ReviewOutcome, CollectError> {
        let mut table = read_table(self.storage, self.table_key)
            .await?
            .ok_or_else(|| CollectError::MissingTable(self.table_key.to_string()))?;

        let mut buffer = PartitionBuffer {
            reviews: Vec::new(),
            next_partition: 1,
            keep_existing: !self.config.overwrite,
            table_dirty: false,
        };
        if self.config.overwrite {
            info!("Overwrite requested; resetting review progress");
            table.values_mut().for_each(|record| record.reset_reviews());
            buffer.table_dirty = true;
        } else if mode == OutputMode::Persist {
            buffer.next_partition = self.free_partition_from(1).await?;
        }

        let pending = self.pending_ids(&table);
        info!(
            pending = pending.len(),
            first_partition = buffer.next_partition,
            "Collecting reviews"
        );

        let pager = ReviewPager::new(self.fetcher, self.config);
        let mut report = ReviewRunReport::default();

        for movie_id in pending {
            let reviews = match pager.collect(&movie_id).await {
                Ok(reviews) => reviews,
                Err(e) => {
                    report.failed += 1;
                    warn!(%movie_id, error = %e, "Failed to collect reviews; will retry next run");
                    continue;
                }
            };

            if let Some(record) = table.get_mut(&movie_id) {
                record.record_reviews(reviews.len());
            }
            report.entities += 1;
            report.reviews += reviews.len();
            buffer.table_dirty = true;
            buffer.reviews.extend(reviews);

            if buffer.reviews.len() >= self.config.partition_size {
                match mode {
                    OutputMode::ReturnResults => {
                        return Ok(ReviewOutcome::Returned(buffer.reviews));
                    }
                    OutputMode::Persist => {
                        self.flush(&table, &mut buffer).await?;
                        report.partitions += 1;
                    }
                }
            }
        }

        match mode {
            OutputMode::ReturnResults => Ok(ReviewOutcome::Returned(buffer.reviews)),
            OutputMode::Persist => {
                if !buffer.reviews.is_empty() {
                    self.flush(&table, &mut buffer).await?;
                    report.partitions += 1;
                } else if buffer.table_dirty {
                    write_table(self.storage, self.table_key, &table).await?;
                }
                info!(
                    partitions = report.partitions,
                    reviews = report.reviews,
                    entities = report.entities,
                    failed = report.failed,
                    "Review run finished"
                );
                Ok(ReviewOutcome::Persisted(report))
            }
        }
    }

    /// Entities with metadata and without reviews, in table order or
    /// shuffled.
    fn pending_ids(&self, table: &EntityTable) -> Vec<String> {
        let mut ids: Vec<String> = table
            .iter()
            .filter(|(_, record)| record.metadata_collected && !record.reviews_collected)
            .map(|(id, _)| id.clone())
            .collect();
        if self.config.shuffle {
            ids.shuffle(&mut rng());
        }
        ids
    }

    /// Lowest partition number `>= from` with no stored object.
    async fn free_partition_from(&self, from: usize) -> Result<usize, CollectError> {
        let mut n = from;
        while self
            .storage
            .exists(&partition_key(self.partition_prefix, n))
            .await?
        {
            debug!(partition = n, "Partition number taken by an earlier run");
            n += 1;
        }
        Ok(n)
    }

    /// Table first, then the partition, so stored reviews always belong to
    /// entities already marked collected.
    async fn flush(&self, table: &EntityTable, buffer: &mut PartitionBuffer) -> Result<(), CollectError> {
        write_table(self.storage, self.table_key, table).await?;

        if buffer.keep_existing {
            buffer.next_partition = self.free_partition_from(buffer.next_partition).await?;
        }
        let rows = partition::flatten(std::mem::take(&mut buffer.reviews));
        let key = partition_key(self.partition_prefix, buffer.next_partition);
        let bytes = partition::encode(&rows)?;
        debug!(%key, bytes = bytes.len(), "Encoded partition");
        self.storage.write_object(&key, bytes).await?;

        info!(%key, rows = rows.len(), partition = buffer.next_partition, "Wrote partition");
        buffer.next_partition += 1;
        buffer.table_dirty = false;
        Ok(())
    }
}
