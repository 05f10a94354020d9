//! Rate-limited page fetching with retry on transient network failures.
//!
//! The module uses a trait-based design so collection loops never depend on a
//! concrete HTTP client:
//! - [`Fetch`]: core trait issuing a single `GET` and opening sessions
//! - [`HttpFetcher`]: `reqwest`-backed implementation
//! - [`RetryFetch`]: decorator that retries transient failures of any [`Fetch`]
//!
//! # Retry Strategy
//!
//! - At most 5 attempts in total
//! - Only connection failures and timeouts are retried; HTTP error statuses
//!   are handed back to the caller as a [`Page`]
//! - Wait between attempts is drawn uniformly from a bounded range
//!   (1 to 5 seconds by default) so parallel runs do not retry in lockstep

use rand::{Rng, rng};
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::config::HttpConfig;

/// Language header sent with every request so pages render in English.
pub const ACCEPT_LANGUAGE_VALUE: &str = "en-US,en;q=0.5";

/// Browser identity used by sessions; the review feed serves different
/// markup to unknown clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/88.0.4324.150 Safari/537.36";

/// Failure to obtain a response at all.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("could not build http client: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Connect { .. } | FetchError::Timeout { .. })
    }

    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            FetchError::Connect {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else {
            FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// A fetched response body together with its status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can issue `GET` requests.
///
/// A session is a request context (cookies, browser identity) that callers
/// reuse across one pagination sequence. One-shot calls go through the
/// fetcher itself.
pub trait Fetch {
    type Session: Fetch;

    /// Issue a `GET` for `url` with the given query parameters appended.
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Page, FetchError>;

    /// Open a fresh session with a browser `User-Agent` and a cookie jar.
    fn open_session(&self) -> Result<Self::Session, FetchError>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build a one-shot fetcher. Every request carries the fixed
    /// `Accept-Language` header.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .default_headers(default_headers())
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client, timeout })
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(ACCEPT_LANGUAGE_VALUE),
    );
    headers
}

impl Fetch for HttpFetcher {
    type Session = HttpFetcher;

    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Page, FetchError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(Page {
            url: url.to_string(),
            status,
            body,
        })
    }

    fn open_session(&self) -> Result<Self::Session, FetchError> {
        let client = reqwest::Client::builder()
            .default_headers(default_headers())
            .user_agent(BROWSER_USER_AGENT)
            .cookie_store(true)
            .timeout(self.timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            timeout: self.timeout,
        })
    }
}

/// Wrapper that retries transient failures of any [`Fetch`] implementation.
///
/// The wait between attempts is drawn uniformly from `wait_min..=wait_max`.
pub struct RetryFetch<T> {
    inner: T,
    max_attempts: usize,
    wait_min: Duration,
    wait_max: Duration,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    /// # Arguments
    ///
    /// * `inner` - The fetcher to wrap
    /// * `max_attempts` - Total number of attempts, including the first
    /// * `wait_min`, `wait_max` - Bounds of the random wait between attempts
    pub fn new(inner: T, max_attempts: usize, wait_min: Duration, wait_max: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            wait_min,
            wait_max: wait_max.max(wait_min),
        }
    }

    /// Wrap `inner` using the retry settings of the `http` config section.
    pub fn from_config(inner: T, config: &HttpConfig) -> Self {
        Self::new(
            inner,
            config.max_attempts,
            Duration::from_secs_f64(config.retry_wait_min_secs),
            Duration::from_secs_f64(config.retry_wait_max_secs),
        )
    }

    fn random_wait(&self) -> Duration {
        if self.wait_max == self.wait_min {
            return self.wait_min;
        }
        let secs = rng().random_range(self.wait_min.as_secs_f64()..=self.wait_max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_attempts", &self.max_attempts)
            .field("wait_min", &self.wait_min)
            .field("wait_max", &self.wait_max)
            .finish()
    }
}

impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    type Session = RetryFetch<T::Session>;

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Page, FetchError> {
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            match self.inner.get(url, query).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.random_wait();
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!(attempt, max = self.max_attempts, error = %e, "fetch exhausted retries");
                    }
                    return Err(e);
                }
            }
        }
    }

    fn open_session(&self) -> Result<Self::Session, FetchError> {
        Ok(RetryFetch {
            inner: self.inner.open_session()?,
            max_attempts: self.max_attempts,
            wait_min: self.wait_min,
            wait_max: self.wait_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFetcher;

    fn no_wait<T: Fetch>(inner: T, attempts: usize) -> RetryFetch<T> {
        RetryFetch::new(inner, attempts, Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retries_transient_failures_until_success() {
        let fake = FakeFetcher::new();
        fake.add_page("https://example.com/a", "hello");
        fake.fail_next("https://example.com/a", 3);

        let fetcher = no_wait(fake.clone(), 5);
        let page = fetcher.get("https://example.com/a", &[]).await.unwrap();

        assert_eq!(page.body, "hello");
        assert_eq!(fake.calls_to("https://example.com/a"), 4);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let fake = FakeFetcher::new();
        fake.add_page("https://example.com/a", "hello");
        fake.fail_next("https://example.com/a", 10);

        let fetcher = no_wait(fake.clone(), 5);
        let err = fetcher.get("https://example.com/a", &[]).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(fake.calls_to("https://example.com/a"), 5);
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_retried() {
        let fake = FakeFetcher::new();
        fake.add_status("https://example.com/missing", 404, "not found");

        let fetcher = no_wait(fake.clone(), 5);
        let page = fetcher.get("https://example.com/missing", &[]).await.unwrap();

        assert_eq!(page.status, 404);
        assert!(!page.is_success());
        assert_eq!(fake.calls_to("https://example.com/missing"), 1);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let fake = FakeFetcher::new();
        // unknown urls fail with a non-transient request error
        let fetcher = no_wait(fake.clone(), 5);
        let err = fetcher.get("https://example.com/unknown", &[]).await.unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(fake.calls_to("https://example.com/unknown"), 1);
    }

    #[test]
    fn test_random_wait_stays_in_bounds() {
        let fetcher = RetryFetch::new(
            FakeFetcher::new(),
            5,
            Duration::from_secs(1),
            Duration::from_secs(5),
        );
        for _ in 0..100 {
            let wait = fetcher.random_wait();
            assert!(wait >= Duration::from_secs(1) && wait <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_transient_classification() {
        let timeout = FetchError::Timeout { url: "u".into() };
        let connect = FetchError::Connect {
            url: "u".into(),
            message: "refused".into(),
        };
        let other = FetchError::Request {
            url: "u".into(),
            message: "bad".into(),
        };
        assert!(timeout.is_transient());
        assert!(connect.is_transient());
        assert!(!other.is_transient());
    }
}
