//! Review partitions: the flattening pipeline and the compressed CSV file.
//!
//! Each raw [`ReviewRecord`] goes through a fixed sequence of steps:
//! 1. helpfulness text is split into `upvotes` and `total_votes`
//! 2. the author link is cut down to its stable prefix
//! 3. the trailing newline of the title is removed
//! 4. the display date is parsed into a calendar date
//! 5. numeric columns are narrowed (`f32` rating, `u16` votes)
//!
//! # Output
//!
//! Gzip-compressed CSV with the header
//! `movie_id,text,rating,title,author,upvotes,total_votes,review_date`,
//! stored under `{prefix}/reviews_partition_{n}.csv.gz`.

use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::ReviewRecord;
use crate::storage::StoreError;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid number regex"));

const DATE_FORMATS: [&str; 3] = ["%d %B %Y", "%B %d, %Y", "%Y-%m-%d"];

/// One row of a persisted partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatReview {
    pub movie_id: String,
    pub text: Option<String>,
    pub rating: Option<f32>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub upvotes: Option<u16>,
    pub total_votes: Option<u16>,
    pub review_date: Option<NaiveDate>,
}

impl From<ReviewRecord> for FlatReview {
    fn from(review: ReviewRecord) -> Self {
        let (upvotes, total_votes) = review
            .helpfulness
            .as_deref()
            .map(split_helpfulness)
            .unwrap_or((None, None));

        FlatReview {
            movie_id: review.movie_id,
            text: review.text,
            rating: review.rating.map(f32::from),
            title: review.title.map(strip_title_newline),
            author: review.author.map(normalize_author),
            upvotes,
            total_votes,
            review_date: review.date.as_deref().and_then(parse_review_date),
        }
    }
}

/// `"1,204 out of 1,350 found this helpful."` gives `(1204, 1350)`.
/// Counts that do not fit a `u16` come out as `None`.
pub fn split_helpfulness(raw: &str) -> (Option<u16>, Option<u16>) {
    let cleaned = raw.replace(',', "");
    let mut numbers = NUMBER_RE.find_iter(&cleaned).map(|m| m.as_str());
    match (numbers.next(), numbers.next()) {
        (Some(up), Some(total)) => (up.parse().ok(), total.parse().ok()),
        _ => (None, None),
    }
}

/// `/user/ur0001/?ref_=tt_urv` becomes `/user/ur0001/`.
pub fn normalize_author(raw: String) -> String {
    match raw.split_once('?') {
        Some((stable, _)) => stable.to_string(),
        None => raw,
    }
}

pub fn strip_title_newline(raw: String) -> String {
    raw.trim_end_matches('\n').to_string()
}

pub fn parse_review_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Run a buffered partition through the pipeline.
pub fn flatten(reviews: Vec<ReviewRecord>) -> Vec<FlatReview> {
    reviews.into_iter().map(FlatReview::from).collect()
}

/// Storage key of partition `number` (1-based).
pub fn partition_key(prefix: &str, number: usize) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        format!("reviews_partition_{number}.csv.gz")
    } else {
        format!("{prefix}/reviews_partition_{number}.csv.gz")
    }
}

/// Encode rows as gzip-compressed CSV with a header row.
pub fn encode(rows: &[FlatReview]) -> Result<Vec<u8>, StoreError> {
    let encode_err = |message: String| StoreError::Encode {
        what: "review partition".into(),
        message,
    };

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut writer = csv::Writer::from_writer(encoder);
    for row in rows {
        writer.serialize(row).map_err(|e| encode_err(e.to_string()))?;
    }
    let encoder = writer
        .into_inner()
        .map_err(|e| encode_err(e.to_string()))?;
    encoder.finish().map_err(|e| encode_err(e.to_string()))
}
