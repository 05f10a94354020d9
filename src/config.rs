//! Run configuration.
//!
//! The whole configuration is read from one YAML document, validated once at
//! startup and then handed to each component by reference. Nothing in here is
//! mutated after [`Config::load`] returns, and no component reads the process
//! environment on its own.
//!
//! ```yaml
//! storage:
//!   backend: local
//!   root: ./data
//! metadata:
//!   genres: [comedy, drama]
//!   pct_titles: 1
//! reviews:
//!   pct_reviews: 10
//!   partition_size: 5000
//! ```

use itertools::Itertools;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::utils::percent_of;

/// Every genre the catalog search can be partitioned by.
pub const GENRES: [&str; 21] = [
    "action",
    "adventure",
    "animation",
    "biography",
    "comedy",
    "crime",
    "drama",
    "family",
    "fantasy",
    "film-noir",
    "history",
    "horror",
    "music",
    "musical",
    "mystery",
    "romance",
    "sci-fi",
    "sport",
    "thriller",
    "war",
    "western",
];

/// Longest wait allowed between two attempts of one request.
pub const MAX_RETRY_WAIT_SECS: f64 = 3600.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default = "default_table_key")]
    pub table_key: String,
    #[serde(default = "default_partition_prefix")]
    pub partition_prefix: String,
    #[serde(default)]
    pub http: HttpConfig,
    pub metadata: MetadataConfig,
    pub reviews: ReviewsConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where the progress table and review partitions live.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Local {
        root: PathBuf,
    },
    Http {
        base_url: String,
        /// Injected from the command line, never read from YAML.
        #[serde(skip)]
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_retry_wait_min")]
    pub retry_wait_min_secs: f64,
    #[serde(default = "default_retry_wait_max")]
    pub retry_wait_max_secs: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_wait_min_secs: default_retry_wait_min(),
            retry_wait_max_secs: default_retry_wait_max(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Either every known genre or an explicit list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GenreSelection {
    Keyword(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    pub genres: GenreSelection,
    #[serde(default)]
    pub pct_titles: Option<f64>,
    #[serde(default)]
    pub n_titles: Option<u64>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_metadata_sleep_ms")]
    pub page_sleep_ms: u64,
    #[serde(default = "default_metadata_sleep_ms")]
    pub entity_sleep_ms: u64,
    #[serde(default)]
    pub max_entities_per_run: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewsConfig {
    pub pct_reviews: f64,
    #[serde(default = "default_partition_size")]
    pub partition_size: usize,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_review_sleep_ms")]
    pub request_sleep_ms: u64,
}

/// How many catalog items to enumerate per genre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coverage {
    Percent(f64),
    Count(u64),
}

impl Coverage {
    /// Number of items to walk for a genre whose catalog holds `total`.
    pub fn max_items(&self, total: u64) -> u64 {
        match *self {
            Coverage::Percent(pct) => percent_of(total, pct),
            Coverage::Count(n) => n.min(total),
        }
    }
}

impl MetadataConfig {
    pub fn coverage(&self) -> Result<Coverage, ConfigError> {
        match (self.pct_titles, self.n_titles) {
            (Some(pct), None) => {
                if !(0.0..=100.0).contains(&pct) {
                    return Err(ConfigError::Invalid(format!(
                        "pct_titles must lie in [0, 100], got {pct}"
                    )));
                }
                Ok(Coverage::Percent(pct))
            }
            (None, Some(n)) => Ok(Coverage::Count(n)),
            _ => Err(ConfigError::Invalid(
                "exactly one of pct_titles or n_titles must be set".into(),
            )),
        }
    }

    /// Resolve the genre selection into the iteration order used by the
    /// identifier collector. Unknown genres are dropped with a warning.
    pub fn genres(&self) -> Result<Vec<String>, ConfigError> {
        let requested: Vec<String> = match &self.genres {
            GenreSelection::Keyword(k) if k == "all" => {
                return Ok(GENRES.iter().map(|g| g.to_string()).collect());
            }
            GenreSelection::Keyword(k) => vec![k.clone()],
            GenreSelection::List(list) if list.iter().any(|g| g == "all") => {
                return Ok(GENRES.iter().map(|g| g.to_string()).collect());
            }
            GenreSelection::List(list) => list.clone(),
        };

        let (known, unknown): (Vec<String>, Vec<String>) = requested
            .into_iter()
            .map(|g| g.trim().to_lowercase())
            .unique()
            .partition(|g| GENRES.contains(&g.as_str()));

        if !unknown.is_empty() {
            warn!(genres = %unknown.join(", "), "Ignoring unknown genres");
        }
        if known.is_empty() {
            return Err(ConfigError::Invalid("no valid genres were passed".into()));
        }
        Ok(known)
    }

    pub fn page_sleep(&self) -> Duration {
        Duration::from_millis(self.page_sleep_ms)
    }

    pub fn entity_sleep(&self) -> Duration {
        Duration::from_millis(self.entity_sleep_ms)
    }
}

impl ReviewsConfig {
    pub fn request_sleep(&self) -> Duration {
        Duration::from_millis(self.request_sleep_ms)
    }
}

impl Config {
    /// Read, parse and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Supply the object-store token obtained at startup.
    pub fn with_storage_token(mut self, token: Option<String>) -> Self {
        if let StorageConfig::Http { token: slot, .. } = &mut self.storage {
            *slot = token;
        }
        self
    }

    /// Reject anything that would only fail after network activity began.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.metadata.coverage()?;
        self.metadata.genres()?;

        if self.metadata.batch_size == 0 {
            return Err(ConfigError::Invalid("metadata.batch_size must be > 0".into()));
        }
        if self.metadata.max_entities_per_run == Some(0) {
            return Err(ConfigError::Invalid(
                "metadata.max_entities_per_run must be > 0 when set".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.reviews.pct_reviews) {
            return Err(ConfigError::Invalid(format!(
                "pct_reviews must lie in [0, 100], got {}",
                self.reviews.pct_reviews
            )));
        }
        if self.reviews.partition_size == 0 {
            return Err(ConfigError::Invalid("reviews.partition_size must be > 0".into()));
        }
        if self.http.max_attempts == 0 {
            return Err(ConfigError::Invalid("http.max_attempts must be > 0".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be > 0".into()));
        }
        // `contains` is false for NaN, so non-finite waits are rejected here
        let waits = 0.0..=MAX_RETRY_WAIT_SECS;
        let (min, max) = (self.http.retry_wait_min_secs, self.http.retry_wait_max_secs);
        if !waits.contains(&min) || !waits.contains(&max) || min > max {
            return Err(ConfigError::Invalid(format!(
                "http retry waits must satisfy 0 <= min <= max <= {MAX_RETRY_WAIT_SECS}, got {min} and {max}"
            )));
        }
        if let StorageConfig::Http { base_url, .. } = &self.storage {
            url::Url::parse(base_url)
                .map_err(|e| ConfigError::Invalid(format!("storage.base_url: {e}")))?;
        }
        if self.table_key.trim().is_empty() {
            return Err(ConfigError::Invalid("table_key must not be empty".into()));
        }
        Ok(())
    }
}

fn default_table_key() -> String {
    "metadata/metadata.json".into()
}

fn default_partition_prefix() -> String {
    "reviews".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> usize {
    5
}

fn default_retry_wait_min() -> f64 {
    1.0
}

fn default_retry_wait_max() -> f64 {
    5.0
}

fn default_batch_size() -> usize {
    100
}

fn default_metadata_sleep_ms() -> u64 {
    200
}

fn default_partition_size() -> usize {
    10_000
}

fn default_shuffle() -> bool {
    true
}

fn default_review_sleep_ms() -> u64 {
    100
}
