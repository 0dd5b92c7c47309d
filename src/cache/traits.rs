//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};

use crate::http::{RequestIdentity, Response};

/// Which generations a lookup searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope<'a> {
  /// Every generation, in creation order
  All,
  /// A single named generation
  Generation(&'a str),
}

/// A response held by a generation.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the entry was written
  pub stored_at: DateTime<Utc>,
}

/// Store of named cache generations, each mapping request identities to responses.
///
/// Writing an identity that already exists replaces the previous entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Open a generation, creating it if absent.
  async fn open(&self, name: &str) -> Result<()>;

  /// Names of all existing generations, in creation order.
  async fn keys(&self) -> Result<Vec<String>>;

  /// Delete a generation and all its entries. Returns whether it existed.
  async fn delete(&self, name: &str) -> Result<bool>;

  /// Find the entry for `identity`. With `CacheScope::All` the first
  /// generation holding it wins.
  async fn match_request(
    &self,
    identity: &RequestIdentity,
    scope: CacheScope<'_>,
  ) -> Result<Option<CachedResponse>>;

  /// Write an entry, creating the generation on first write.
  async fn put(&self, name: &str, identity: &RequestIdentity, response: Response) -> Result<()>;

  /// Number of entries in a generation (0 if absent).
  async fn entry_count(&self, name: &str) -> Result<usize>;

  /// `stored_at` of the most recent write into a generation, if it holds any entry.
  async fn latest_write(&self, name: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Reject writes a cache must never hold.
pub(crate) fn ensure_storable(identity: &RequestIdentity, response: &Response) -> Result<()> {
  if !identity.is_cacheable() {
    return Err(eyre!("Refusing to cache {}: only GET is cacheable", identity));
  }
  if response.is_network_error() {
    return Err(eyre!("Refusing to cache {}: network error response", identity));
  }
  if response.is_partial() {
    return Err(eyre!("Refusing to cache {}: partial content", identity));
  }
  Ok(())
}
