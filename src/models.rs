//! Data models for catalog entities, scraped metadata and reviews.
//!
//! - [`EntityRecord`]: one progress row per catalog title
//! - [`EntityTable`]: the whole progress table, keyed by title id
//! - [`MovieMetadata`]: fields scraped from a title page
//! - [`ReviewRecord`]: one review as scraped from the review feed

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Progress and scraped data for a single catalog title.
///
/// Scraped metadata fields live in `fields` and are only present once
/// `metadata_collected` is true. Missing flags on records written by older
/// runs read back as false/0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(default)]
    pub metadata_collected: bool,
    #[serde(default)]
    pub reviews_collected: bool,
    #[serde(default)]
    pub reviews_collected_count: u64,
    /// Primary genre as shown on the listing the id was discovered on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_genre: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EntityRecord {
    pub fn discovered(main_genre: Option<String>) -> Self {
        Self {
            main_genre,
            ..Self::default()
        }
    }

    /// Merge scraped fields and mark metadata as collected in one step.
    pub fn record_metadata(&mut self, fields: Map<String, Value>) {
        for (k, v) in fields {
            self.fields.insert(k, v);
        }
        self.metadata_collected = true;
    }

    pub fn record_reviews(&mut self, count: usize) {
        self.reviews_collected = true;
        self.reviews_collected_count = count as u64;
    }

    pub fn reset_reviews(&mut self) {
        self.reviews_collected = false;
        self.reviews_collected_count = 0;
    }
}

/// The progress table: title id to record, iterated in id order.
pub type EntityTable = BTreeMap<String, EntityRecord>;

/// `user_review_num`, `critic_review_num`, `metascore` as displayed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub user_review_num: Option<String>,
    pub critic_review_num: Option<String>,
    pub metascore: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRating {
    pub avg_rating: Option<String>,
    pub num_votes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TitleDetails {
    pub release_date: Option<Vec<String>>,
    pub countries_of_origin: Option<Vec<String>>,
    pub language: Option<Vec<String>>,
    pub also_known_as: Option<Vec<String>>,
    pub production_companies: Option<Vec<String>>,
    pub filming_locations: Option<Vec<String>>,
    pub runtime: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxOffice {
    pub budget: Option<String>,
    pub boxoffice_gross_domestic: Option<String>,
    pub boxoffice_gross_opening: Option<String>,
    pub boxoffice_gross_worldwide: Option<String>,
}

/// Everything scraped from a title page. Every field is independently
/// optional; serializing always emits every key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieMetadata {
    pub original_title: Option<String>,
    pub genres: Option<Vec<String>>,
    pub director: Option<String>,
    pub poster_url: Option<String>,
    pub review_summary: ReviewSummary,
    pub agg_rating: Option<AggregateRating>,
    /// Billing rank to person link.
    pub actors: BTreeMap<String, String>,
    /// Recommendation rank to title link.
    pub imdb_recommendations: BTreeMap<String, String>,
    pub details: TitleDetails,
    pub boxoffice: BoxOffice,
}

impl MovieMetadata {
    /// Keys every collected entity carries.
    pub const KEYS: [&'static str; 10] = [
        "original_title",
        "genres",
        "director",
        "poster_url",
        "review_summary",
        "agg_rating",
        "actors",
        "imdb_recommendations",
        "details",
        "boxoffice",
    ];

    pub fn into_fields(self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // a struct of strings and maps always serializes to an object
            _ => Map::new(),
        }
    }
}

/// A single user review. Held in memory until its partition is flushed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub movie_id: String,
    pub text: Option<String>,
    pub rating: Option<u8>,
    pub date: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Raw "`X out of Y found this helpful`" text.
    pub helpfulness: Option<String>,
}
