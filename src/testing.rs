//! Network-free doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::fetch::{Fetch, FetchError, Page};
use crate::storage::{Storage, StoreError};

/// Builds the lookup key for a request; query pairs are sorted so tests do
/// not depend on parameter order.
pub fn request_key(url: &str, query: &[(&str, &str)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }
    let mut pairs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    format!("{url}?{}", pairs.join("&"))
}

#[derive(Default)]
struct FakeState {
    pages: HashMap<String, (u16, String)>,
    failures: HashMap<String, usize>,
    calls: Vec<String>,
    sessions: usize,
}

/// Scripted fetcher: answers canned pages by request key, can fail a key a
/// given number of times with a transient error, and records every call.
/// Unknown keys fail with a non-transient error.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    state: Arc<Mutex<FakeState>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&self, key: &str, body: &str) {
        self.add_status(key, 200, body);
    }

    pub fn add_status(&self, key: &str, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .pages
            .insert(key.to_string(), (status, body.to_string()));
    }

    pub fn fail_next(&self, key: &str, times: usize) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(key.to_string(), times);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, key: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == key)
            .count()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().unwrap().sessions
    }
}

impl Fetch for FakeFetcher {
    type Session = FakeFetcher;

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<Page, FetchError> {
        let key = request_key(url, query);
        let mut state = self.state.lock().unwrap();
        state.calls.push(key.clone());

        if let Some(remaining) = state.failures.get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::Connect {
                    url: key,
                    message: "connection refused".into(),
                });
            }
        }

        match state.pages.get(&key) {
            Some((status, body)) => Ok(Page {
                url: url.to_string(),
                status: *status,
                body: body.clone(),
            }),
            None => Err(FetchError::Request {
                url: key,
                message: "no scripted page".into(),
            }),
        }
    }

    fn open_session(&self) -> Result<Self::Session, FetchError> {
        self.state.lock().unwrap().sessions += 1;
        Ok(self.clone())
    }
}

/// In-memory object store.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    writes: Arc<Mutex<Vec<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Keys in the order they were written, repeats included.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

impl Storage for MemoryStorage {
    async fn read_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.get(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn write_object(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push(key.to_string());
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes);
        Ok(())
    }
}
