//! Identifier discovery over the genre-partitioned search listing.
//!
//! For each genre the collector first learns the catalog size, turns the
//! configured coverage into `max_items`, then walks the listing in pages of
//! [`PAGE_SIZE`] starting at offset 1. Offsets are inclusive: pages start at
//! `1, 51, 101, …` while `offset <= max_items`.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use super::search_url;
use crate::config::{ConfigError, Coverage, MetadataConfig};
use crate::fetch::Fetch;
use crate::models::{EntityRecord, EntityTable};
use crate::scrapers::listing::{self, ListingItem};
use crate::utils::truncate_for_log;

/// Items per listing page.
pub const PAGE_SIZE: u64 = 50;

/// Query parameters of one listing page.
pub fn listing_query<'a>(genre: &'a str, start: &'a str) -> [(&'a str, &'a str); 6] {
    [
        ("title_type", "feature"),
        ("genres", genre),
        ("sort", "num_votes,desc"),
        ("start", start),
        ("explore", "genres"),
        ("ref_", "adv_nxt"),
    ]
}

/// Page start offsets covering the first `max_items` listing positions.
pub fn page_offsets(max_items: u64) -> impl Iterator<Item = u64> {
    (1..=max_items).step_by(PAGE_SIZE as usize)
}

pub struct IdCollector<'a, F> {
    fetcher: &'a F,
    genres: Vec<String>,
    coverage: Coverage,
    page_sleep: Duration,
}

impl<'a, F: Fetch> IdCollector<'a, F> {
    pub fn new(fetcher: &'a F, config: &MetadataConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            fetcher,
            genres: config.genres()?,
            coverage: config.coverage()?,
            page_sleep: config.page_sleep(),
        })
    }

    /// Discover ids across all configured genres.
    ///
    /// The result is a fresh table with every flag false. When an id shows up
    /// under several genres, the record from the first genre visited is kept.
    #[instrument(level = "info", skip_all, fields(genres = self.genres.len()))]
    pub async fn collect(&self) -> EntityTable {
        let mut table = EntityTable::new();

        for genre in &self.genres {
            let before = table.len();
            for item in self.collect_genre(genre).await {
                table
                    .entry(item.id)
                    .or_insert_with(|| EntityRecord::discovered(item.main_genre));
            }
            info!(%genre, new_ids = table.len() - before, total = table.len(), "Finished genre");
        }

        table
    }

    async fn collect_genre(&self, genre: &str) -> Vec<ListingItem> {
        let Some(total) = self.genre_total(genre).await else {
            return Vec::new();
        };
        let max_items = self.coverage.max_items(total);
        info!(%genre, total, max_items, "Walking genre listing");

        let mut items = Vec::new();
        for start in page_offsets(max_items) {
            let page_items = self.collect_page(genre, start).await;
            info!(
                %genre,
                from = start,
                to = start + PAGE_SIZE - 1,
                count = page_items.len(),
                "Collected listing page"
            );
            items.extend(page_items);
            sleep(self.page_sleep).await;
        }
        items
    }

    /// Catalog size of a genre, `None` when it cannot be learned.
    async fn genre_total(&self, genre: &str) -> Option<u64> {
        let query = listing_query(genre, "1");
        match self.fetcher.get(&search_url(), &query).await {
            Ok(page) if page.is_success() => {
                let total = listing::total_count(&page.body);
                if total.is_none() {
                    warn!(
                        %genre,
                        body = %truncate_for_log(&page.body, 200),
                        "Could not read catalog size; skipping genre"
                    );
                }
                total
            }
            Ok(page) => {
                warn!(%genre, status = page.status, "Bad status reading catalog size; skipping genre");
                None
            }
            Err(e) => {
                warn!(%genre, error = %e, "Failed to read catalog size; skipping genre");
                None
            }
        }
    }

    /// Items of one page. Failures contribute nothing.
    async fn collect_page(&self, genre: &str, start: u64) -> Vec<ListingItem> {
        let start_param = start.to_string();
        let query = listing_query(genre, &start_param);
        match self.fetcher.get(&search_url(), &query).await {
            Ok(page) if page.is_success() => listing::items(&page.body),
            Ok(page) => {
                warn!(%genre, start, status = page.status, "Bad status on listing page");
                Vec::new()
            }
            Err(e) => {
                warn!(%genre, start, error = %e, "Failed to fetch listing page");
                Vec::new()
            }
        }
    }
}
