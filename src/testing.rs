//! Scripted network for unit tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::http::{FetchCache, Fetcher, Request, Response};

pub fn url(s: &str) -> Url {
  Url::parse(s).unwrap()
}

/// Answers from a fixed URL table; unknown URLs and offline mode fail.
#[derive(Default)]
pub struct StubFetcher {
  routes: Mutex<HashMap<String, Response>>,
  calls: Mutex<Vec<(Url, FetchCache)>>,
  offline: AtomicBool,
}

impl StubFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn cache_modes(&self) -> Vec<FetchCache> {
    self.calls.lock().unwrap().iter().map(|(_, c)| *c).collect()
  }
}

#[async_trait]
impl Fetcher for StubFetcher {
  async fn fetch(&self, request: &Request, cache: FetchCache) -> Result<Response> {
    self.calls.lock().unwrap().push((request.url.clone(), cache));

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Failed to fetch {}: network unreachable", request.url));
    }

    self
      .routes
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(|| eyre!("Failed to fetch {}: connection refused", request.url))
  }
}
