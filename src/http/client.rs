//! Network access used by the strategies and the precache step.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{CACHE_CONTROL, PRAGMA};

use super::types::{FetchCache, Request, Response};

/// Issues requests against the real network.
///
/// An `Err` means the network was unreachable. HTTP error statuses are
/// ordinary responses.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request, cache: FetchCache) -> Result<Response>;
}

/// `reqwest`-backed fetcher.
#[derive(Clone)]
pub struct ReqwestFetcher {
  client: reqwest::Client,
}

impl ReqwestFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("shellcache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
  async fn fetch(&self, request: &Request, cache: FetchCache) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    if cache == FetchCache::NoStore {
      builder = builder
        .header(CACHE_CONTROL, "no-store")
        .header(PRAGMA, "no-cache");
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response::new(status, headers, body))
  }
}
