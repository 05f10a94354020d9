//! Storage backends for the progress table and review partitions.
//!
//! Components only depend on the [`Storage`] capability. Two backends exist:
//! - [`LocalStorage`]: files under a root directory
//! - [`HttpObjectStorage`]: an object store reachable over plain `GET`/`PUT`

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument};

use crate::config::{HttpConfig, StorageConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("object store request for {key} failed: {source}")]
    Http { key: String, source: reqwest::Error },
    #[error("object store returned status {status} for {key}")]
    Status { key: String, status: u16 },
    #[error("could not encode {what}: {message}")]
    Encode { what: String, message: String },
    #[error("could not decode {key}: {message}")]
    Decode { key: String, message: String },
}

/// Read and overwrite whole objects by key.
pub trait Storage {
    /// `Ok(None)` when the object does not exist.
    async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Whether an object is stored at `key`, without fetching it.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Replace the object at `key` with `bytes`.
    async fn write_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
}

/// Objects stored as files below `root`; keys are relative paths.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl Storage for LocalStorage {
    async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key);
        fs::try_exists(&path).await.map_err(|e| io_error(&path, e))
    }

    /// Writes to a sibling temp file and renames it over the target, so an
    /// interrupted write leaves the previous object intact.
    #[instrument(level = "debug", skip(self, bytes), fields(bytes = bytes.len()))]
    async fn write_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        fs::write(&tmp, &bytes).await.map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).await.map_err(|e| io_error(&path, e))?;
        debug!(path = %path.display(), "Wrote object");
        Ok(())
    }
}

/// Objects addressed as `{base_url}/{key}` on an HTTP object store.
#[derive(Debug, Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(client: reqwest::Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url_for(&self, key: &str) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .filter(|part| !part.is_empty())
            .map(|part| urlencoding::encode(part).into_owned())
            .collect();
        format!("{}/{}", self.base_url, encoded.join("/"))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl Storage for HttpObjectStorage {
    async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let http_err = |source| StoreError::Http {
            key: key.to_string(),
            source,
        };
        let response = self
            .authorize(self.client.get(self.url_for(key)))
            .send()
            .await
            .map_err(http_err)?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(http_err)?;
        Ok(Some(bytes.to_vec()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let response = self
            .authorize(self.client.head(self.url_for(key)))
            .send()
            .await
            .map_err(|source| StoreError::Http {
                key: key.to_string(),
                source,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(true)
    }

    #[instrument(level = "debug", skip(self, bytes), fields(bytes = bytes.len()))]
    async fn write_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.put(self.url_for(key)).body(bytes))
            .send()
            .await
            .map_err(|source| StoreError::Http {
                key: key.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                key: key.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// The backend selected by configuration.
#[derive(Debug, Clone)]
pub enum Backend {
    Local(LocalStorage),
    Http(HttpObjectStorage),
}

impl Backend {
    pub fn from_config(storage: &StorageConfig, http: &HttpConfig) -> Result<Self, StoreError> {
        match storage {
            StorageConfig::Local { root } => Ok(Backend::Local(LocalStorage::new(root))),
            StorageConfig::Http { base_url, token } => {
                let client = reqwest::Client::builder()
                    .timeout(http.timeout())
                    .build()
                    .map_err(|source| StoreError::Http {
                        key: base_url.clone(),
                        source,
                    })?;
                Ok(Backend::Http(HttpObjectStorage::new(
                    client,
                    base_url,
                    token.clone(),
                )))
            }
        }
    }
}

impl Storage for Backend {
    async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self {
            Backend::Local(s) => s.read_object(key).await,
            Backend::Http(s) => s.read_object(key).await,
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match self {
            Backend::Local(s) => s.exists(key).await,
            Backend::Http(s) => s.exists(key).await,
        }
    }

    async fn write_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        match self {
            Backend::Local(s) => s.write_object(key, bytes).await,
            Backend::Http(s) => s.write_object(key, bytes).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_missing_object_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        assert!(storage.read_object("metadata/none.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_write_then_read_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage
            .write_object("metadata/metadata.json", b"{}".to_vec())
            .await
            .unwrap();
        storage
            .write_object("metadata/metadata.json", b"{\"a\":1}".to_vec())
            .await
            .unwrap();

        let bytes = storage.read_object("metadata/metadata.json").await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"{\"a\":1}"[..]));
        assert!(!dir.path().join("metadata/metadata.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_local_exists() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        assert!(!storage.exists("reviews/reviews_partition_1.csv.gz").await.unwrap());
        storage
            .write_object("reviews/reviews_partition_1.csv.gz", vec![1, 2, 3])
            .await
            .unwrap();
        assert!(storage.exists("reviews/reviews_partition_1.csv.gz").await.unwrap());
        assert!(!storage.exists("reviews/reviews_partition_2.csv.gz").await.unwrap());
    }

    #[test]
    fn test_http_url_for_key() {
        let storage = HttpObjectStorage::new(
            reqwest::Client::new(),
            "https://store.example.com/bucket/",
            None,
        );
        assert_eq!(
            storage.url_for("reviews/reviews_partition_1.csv.gz"),
            "https://store.example.com/bucket/reviews/reviews_partition_1.csv.gz"
        );
        assert_eq!(
            storage.url_for("odd name.json"),
            "https://store.example.com/bucket/odd%20name.json"
        );
    }
}
