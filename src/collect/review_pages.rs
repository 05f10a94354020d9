//! Paginated review collection for a single entity.
//!
//! The feed is walked in feed order (helpfulness, descending). After every
//! fetched batch the accumulated count is compared against the target; the
//! last batch is always kept whole, so an entity may end with slightly more
//! reviews than its target.
//!
//! ```text
//! FETCHING --(count > target | no next key | empty batch)--> DONE
//!    ^                  |
//!    +---- next key ----+
//! ```

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::{EntityError, reviews_ajax_url, reviews_url};
use crate::config::ReviewsConfig;
use crate::fetch::{Fetch, Page};
use crate::models::ReviewRecord;
use crate::scrapers::reviews::{self, ContinuationToken, ReviewBatch};
use crate::utils::percent_of;

/// Feed ordering and filter used for every review request.
const FEED_QUERY: [(&str, &str); 3] = [
    ("sort", "helpfulnessScore"),
    ("dir", "desc"),
    ("ratingFilter", "0"),
];

pub struct ReviewPager<'a, F> {
    fetcher: &'a F,
    pct_reviews: f64,
    request_sleep: Duration,
}

impl<'a, F: Fetch> ReviewPager<'a, F> {
    pub fn new(fetcher: &'a F, config: &ReviewsConfig) -> Self {
        Self {
            fetcher,
            pct_reviews: config.pct_reviews,
            request_sleep: config.request_sleep(),
        }
    }

    /// Collect roughly `pct_reviews` percent of an entity's reviews.
    ///
    /// # Returns
    ///
    /// Every review of every fetched batch. Fails only when the first feed
    /// page cannot be fetched; later failures keep the last good page.
    #[instrument(level = "info", skip(self))]
    pub async fn collect(&self, movie_id: &str) -> Result<Vec<ReviewRecord>, EntityError> {
        let session = self.fetcher.open_session()?;
        let total = self.total_reviews(movie_id).await;
        let target = percent_of(total, self.pct_reviews);
        debug!(total, target, "Review target");

        sleep(self.request_sleep).await;
        let first = self.first_page(&session, movie_id).await?;

        let mut collected = Vec::new();
        let mut page = first;
        let mut pages = 1usize;
        let mut next = absorb(&page, movie_id, target, &mut collected);
        while let Some(cursor) = next {
            sleep(self.request_sleep).await;
            match self.next_page(&session, movie_id, &cursor).await {
                Ok(next_page) => page = next_page,
                Err(e) => warn!(error = %e, "Continuation fetch failed; reusing last page"),
            }
            pages += 1;
            next = absorb(&page, movie_id, target, &mut collected);
        }

        info!(reviews = collected.len(), pages, target, "Collected reviews");
        Ok(collected)
    }

    /// Review count from the feed header, 0 when it cannot be read.
    async fn total_reviews(&self, movie_id: &str) -> u64 {
        match self.fetcher.get(&reviews_url(movie_id), &[]).await {
            Ok(page) if page.is_success() => reviews::total_count(&page.body).unwrap_or(0),
            Ok(page) => {
                warn!(status = page.status, "Bad status reading review count");
                0
            }
            Err(e) => {
                warn!(error = %e, "Failed to read review count");
                0
            }
        }
    }

    async fn first_page(&self, session: &F::Session, movie_id: &str) -> Result<Page, EntityError> {
        let url = reviews_url(movie_id);
        let page = session.get(&url, &FEED_QUERY).await?;
        if !page.is_success() {
            return Err(EntityError::Status {
                url: page.url,
                status: page.status,
            });
        }
        Ok(page)
    }

    async fn next_page(
        &self,
        session: &F::Session,
        movie_id: &str,
        cursor: &ContinuationToken,
    ) -> Result<Page, EntityError> {
        let url = reviews_ajax_url(movie_id);
        let query = continuation_query(cursor);
        let page = session.get(&url, &query).await?;
        if !page.is_success() {
            return Err(EntityError::Status {
                url: page.url,
                status: page.status,
            });
        }
        Ok(page)
    }
}

/// Append the page's batch and decide whether to continue. The batch is
/// always kept whole; the cutoff is checked only afterwards.
fn absorb(
    page: &Page,
    movie_id: &str,
    target: u64,
    collected: &mut Vec<ReviewRecord>,
) -> Option<ContinuationToken> {
    let ReviewBatch { reviews, next } = reviews::review_batch(&page.body, movie_id);
    let batch_len = reviews.len();
    collected.extend(reviews);

    if batch_len == 0 || collected.len() as u64 > target {
        return None;
    }
    next
}

fn continuation_query(cursor: &ContinuationToken) -> [(&str, &str); 5] {
    let [sort, dir, filter] = FEED_QUERY;
    [
        sort,
        dir,
        filter,
        ("ref_", "undefined"),
        ("paginationKey", cursor.as_str()),
    ]
}
