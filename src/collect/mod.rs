//! Incremental collection engine.
//!
//! Collection follows a two-phase pattern over the durable progress table:
//!
//! 1. **Metadata** ([`metadata`]): bootstrap the table through the identifier
//!    collector ([`ids`]) when needed, then fill in title metadata for every
//!    pending entity, checkpointing the whole table every batch.
//! 2. **Reviews** ([`reviews`]): walk the review feed of every entity with
//!    metadata through the paginating engine ([`review_pages`]) and persist the
//!    results as numbered partitions.
//!
//! Every loop is strictly sequential: one request or one rate-limit sleep at a
//! time. A failure for one entity is logged and leaves that entity pending;
//! only storage and configuration errors end a run.

pub mod ids;
pub mod metadata;
pub mod review_pages;
pub mod reviews;

use thiserror::Error;

use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::storage::StoreError;

pub const SITE_URL: &str = "https://www.imdb.com";

/// Run-level failures. These abort the whole run.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("no progress table at {0}; collect metadata first")]
    MissingTable(String),
}

/// Why a single entity could not be collected in this run.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

pub fn search_url() -> String {
    format!("{SITE_URL}/search/title/")
}

pub fn title_url(id: &str) -> String {
    format!("{SITE_URL}/title/{id}/")
}

pub fn reviews_url(id: &str) -> String {
    format!("{SITE_URL}/title/{id}/reviews")
}

pub fn reviews_ajax_url(id: &str) -> String {
    format!("{SITE_URL}/title/{id}/reviews/_ajax")
}
