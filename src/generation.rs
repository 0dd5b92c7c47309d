//! Install and activate lifecycle of the two cache generations.

use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::http::{FetchCache, Fetcher, Request};

/// Names of the current static and dynamic generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationNames {
  static_name: String,
  dynamic_name: String,
}

impl GenerationNames {
  pub fn new(static_name: &str, dynamic_name: &str) -> Self {
    Self {
      static_name: static_name.to_string(),
      dynamic_name: dynamic_name.to_string(),
    }
  }

  /// Holds the precached app shell.
  pub fn static_name(&self) -> &str {
    &self.static_name
  }

  /// Receives write-through entries at runtime.
  pub fn dynamic_name(&self) -> &str {
    &self.dynamic_name
  }

  /// Whether `name` belongs to the current version.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}

/// Outcome of populating the static generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  pub cached: Vec<Url>,
  pub failed: Vec<Url>,
}

pub struct GenerationManager<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  names: GenerationNames,
  precache: Vec<Url>,
}

impl<S: CacheStore, F: Fetcher> GenerationManager<S, F> {
  pub fn new(store: Arc<S>, fetcher: Arc<F>, names: GenerationNames, precache: Vec<Url>) -> Self {
    Self {
      store,
      fetcher,
      names,
      precache,
    }
  }

  /// Open the static generation and fill it with the precache list.
  ///
  /// Each URL is attempted independently; a URL that cannot be fetched or
  /// stored is reported in `failed` and does not fail the install.
  pub async fn initialize(&self) -> Result<InstallReport> {
    self.store.open(self.names.static_name()).await?;

    let results = join_all(self.precache.iter().map(|url| self.precache_one(url))).await;

    let mut report = InstallReport::default();
    for (url, result) in self.precache.iter().zip(results) {
      match result {
        Ok(()) => report.cached.push(url.clone()),
        Err(e) => {
          warn!(url = %url, error = %e, "Precache failed, skipping");
          report.failed.push(url.clone());
        }
      }
    }

    info!(
      generation = self.names.static_name(),
      cached = report.cached.len(),
      failed = report.failed.len(),
      "Static generation populated"
    );

    Ok(report)
  }

  async fn precache_one(&self, url: &Url) -> Result<()> {
    let request = Request::get(url.clone());
    let response = self.fetcher.fetch(&request, FetchCache::Default).await?;

    if !response.ok() {
      return Err(eyre!("Unexpected status {} for {}", response.status, url));
    }

    self
      .store
      .put(self.names.static_name(), &request.identity(), response)
      .await
  }

  /// Delete every generation that is not one of the two current names.
  ///
  /// Returns the names that were removed.
  pub async fn reclaim(&self) -> Result<Vec<String>> {
    let stale: Vec<String> = self
      .store
      .keys()
      .await?
      .into_iter()
      .filter(|name| !self.names.is_current(name))
      .collect();

    try_join_all(stale.iter().map(|name| async move {
      debug!(generation = %name, "Deleting superseded generation");
      self.store.delete(name).await
    }))
    .await?;

    if !stale.is_empty() {
      info!(deleted = ?stale, "Superseded generations removed");
    }

    Ok(stale)
  }
}
