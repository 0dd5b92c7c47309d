//! Fetch strategies and their fallback chains.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheScope, CacheStore};
use crate::generation::GenerationNames;
use crate::http::{FetchCache, Fetcher, Request, RequestIdentity, Response};

/// Where a response handed to the page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Entry for this request found in a generation
  Cache,
  /// Offline fallback page served in place of a navigation
  AppShell,
  /// Synthetic empty JSON body
  Placeholder,
  /// Nothing available
  NetworkError,
}

/// Response plus metadata about its source.
#[derive(Debug, Clone)]
pub struct Outcome {
  pub response: Response,
  pub source: ResponseSource,
}

impl Outcome {
  fn new(response: Response, source: ResponseSource) -> Self {
    Self { response, source }
  }

  pub fn network_error() -> Self {
    Self::new(Response::error(), ResponseSource::NetworkError)
  }
}

/// Runs the per-route strategies against a cache store and the network.
pub struct StrategyExecutor<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  names: GenerationNames,
  app_shell: RequestIdentity,
}

impl<S: CacheStore, F: Fetcher> StrategyExecutor<S, F> {
  pub fn new(
    store: Arc<S>,
    fetcher: Arc<F>,
    names: GenerationNames,
    app_shell: RequestIdentity,
  ) -> Self {
    Self {
      store,
      fetcher,
      names,
      app_shell,
    }
  }

  /// Network-first, bypassing HTTP caches.
  ///
  /// 1. Fetch with no-store; on success write through to the dynamic generation
  /// 2. On failure, serve the dynamic generation's entry
  /// 3. Otherwise answer `{}` so JSON callers always get a body
  pub async fn api(&self, request: &Request) -> Result<Outcome> {
    match self.fetcher.fetch(request, FetchCache::NoStore).await {
      Ok(response) => {
        self.write_through(request, &response).await;
        Ok(Outcome::new(response, ResponseSource::Network))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "API fetch failed, trying cache");
        let cached = self
          .store
          .match_request(
            &request.identity(),
            CacheScope::Generation(self.names.dynamic_name()),
          )
          .await?;

        Ok(match cached {
          Some(hit) => Outcome::new(hit.response, ResponseSource::Cache),
          None => Outcome::new(Response::empty_json(), ResponseSource::Placeholder),
        })
      }
    }
  }

  /// Network-first with the app shell as the last resort.
  ///
  /// The exact request is looked up in the dynamic generation only, while the
  /// app shell is looked up across every generation.
  pub async fn navigation(&self, request: &Request) -> Result<Outcome> {
    let error = match self.fetcher.fetch(request, FetchCache::Default).await {
      Ok(response) => {
        self.write_through(request, &response).await;
        return Ok(Outcome::new(response, ResponseSource::Network));
      }
      Err(e) => e,
    };
    debug!(url = %request.url, error = %error, "Navigation failed, trying cache");

    let cached = self
      .store
      .match_request(
        &request.identity(),
        CacheScope::Generation(self.names.dynamic_name()),
      )
      .await?;
    if let Some(hit) = cached {
      return Ok(Outcome::new(hit.response, ResponseSource::Cache));
    }

    let shell = self
      .store
      .match_request(&self.app_shell, CacheScope::All)
      .await?;
    Ok(match shell {
      Some(hit) => Outcome::new(hit.response, ResponseSource::AppShell),
      None => {
        warn!(url = %request.url, "Offline with no app shell cached");
        Outcome::network_error()
      }
    })
  }

  /// Cache-first.
  ///
  /// A hit in any generation is returned without touching the network. A miss
  /// is fetched and written through; if that fails too the page gets a
  /// network error.
  pub async fn static_asset(&self, request: &Request) -> Result<Outcome> {
    let cached = self
      .store
      .match_request(&request.identity(), CacheScope::All)
      .await?;
    if let Some(hit) = cached {
      return Ok(Outcome::new(hit.response, ResponseSource::Cache));
    }

    match self.fetcher.fetch(request, FetchCache::Default).await {
      Ok(response) => {
        self.write_through(request, &response).await;
        Ok(Outcome::new(response, ResponseSource::Network))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Static asset unavailable");
        Ok(Outcome::network_error())
      }
    }
  }

  /// Network with a read-only cache fallback.
  pub async fn passthrough(&self, request: &Request) -> Result<Outcome> {
    match self.fetcher.fetch(request, FetchCache::Default).await {
      Ok(response) => Ok(Outcome::new(response, ResponseSource::Network)),
      Err(e) => {
        debug!(url = %request.url, error = %e, "Fetch failed, trying cache");
        let cached = self
          .store
          .match_request(&request.identity(), CacheScope::All)
          .await?;

        Ok(match cached {
          Some(hit) => Outcome::new(hit.response, ResponseSource::Cache),
          None => Outcome::network_error(),
        })
      }
    }
  }

  /// Store a duplicate of `response` in the dynamic generation.
  ///
  /// A failed write never affects what the page receives.
  async fn write_through(&self, request: &Request, response: &Response) {
    let identity = request.identity();
    if let Err(e) = self
      .store
      .put(self.names.dynamic_name(), &identity, response.clone())
      .await
    {
      warn!(request = %identity, error = %e, "Write-through failed");
    }
  }
}
