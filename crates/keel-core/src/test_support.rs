//! Fetcher doubles shared by the cache crates' tests.
//!
//! These live in the library (not `#[cfg(test)]`) so downstream crates can
//! use them in their own integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::{FetchError, FetchResponse, Fetcher};

/// Serves canned responses per URL and records every fetch.
///
/// URLs without a configured route behave like an unreachable network, which
/// is the degradation path the caches must survive.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    routes: Mutex<HashMap<String, FetchResponse>>,
    calls: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, url: impl Into<String>, response: FetchResponse) -> Self {
        self.insert(url, response);
        self
    }

    pub fn insert(&self, url: impl Into<String>, response: FetchResponse) {
        self.routes.lock().unwrap().insert(url.into(), response);
    }

    pub fn remove(&self, url: &str) {
        self.routes.lock().unwrap().remove(url);
    }

    /// Every URL fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|candidate| candidate.as_str() == url)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.routes.lock().unwrap().get(url) {
            Some(response) => Ok(response.clone()),
            None => Err(FetchError::Network {
                url: url.to_string(),
                message: "no route configured".to_string(),
            }),
        }
    }
}

/// A fetcher for which the network is always down.
#[derive(Debug, Default)]
pub struct FailingFetcher;

#[async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        Err(FetchError::Network {
            url: url.to_string(),
            message: "simulated network failure".to_string(),
        })
    }
}

/// Holds every fetch until the gate is opened.
///
/// Lets tests pile up N concurrent callers before the first I/O completes,
/// which is exactly the window the single-flight dedup must cover.
pub struct GatedFetcher<F> {
    inner: F,
    gate: watch::Receiver<bool>,
}

/// Opens the gate of a [`GatedFetcher`]. Dropping the control also opens it
/// so a panicking test cannot deadlock its sibling tasks.
pub struct GateControl {
    tx: watch::Sender<bool>,
}

impl GateControl {
    pub fn open(&self) {
        let _ = self.tx.send(true);
    }
}

impl Drop for GateControl {
    fn drop(&mut self) {
        let _ = self.tx.send(true);
    }
}

impl<F: Fetcher> GatedFetcher<F> {
    pub fn new(inner: F) -> (Self, GateControl) {
        let (tx, rx) = watch::channel(false);
        (Self { inner, gate: rx }, GateControl { tx })
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for GatedFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let mut gate = self.gate.clone();
        while !*gate.borrow() {
            if gate.changed().await.is_err() {
                break;
            }
        }
        self.inner.fetch(url).await
    }
}
