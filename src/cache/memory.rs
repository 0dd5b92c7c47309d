//! In-process cache store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::traits::{ensure_storable, CacheScope, CacheStore, CachedResponse};
use crate::http::{RequestIdentity, Response};

struct Generation {
  name: String,
  entries: HashMap<String, CachedResponse>,
}

impl Generation {
  fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
      entries: HashMap::new(),
    }
  }
}

/// Cache store that lives in memory for the life of the process.
#[derive(Default)]
pub struct MemoryStore {
  /// Kept in creation order
  generations: Mutex<Vec<Generation>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Vec<Generation>>> {
    self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn find_or_create<'a>(generations: &'a mut Vec<Generation>, name: &str) -> &'a mut Generation {
  match generations.iter().position(|g| g.name == name) {
    Some(index) => &mut generations[index],
    None => {
      generations.push(Generation::new(name));
      let last = generations.len() - 1;
      &mut generations[last]
    }
  }
}

#[async_trait]
impl CacheStore for MemoryStore {
  async fn open(&self, name: &str) -> Result<()> {
    let mut generations = self.lock()?;
    find_or_create(&mut generations, name);
    Ok(())
  }

  async fn keys(&self) -> Result<Vec<String>> {
    let generations = self.lock()?;
    Ok(generations.iter().map(|g| g.name.clone()).collect())
  }

  async fn delete(&self, name: &str) -> Result<bool> {
    let mut generations = self.lock()?;
    let before = generations.len();
    generations.retain(|g| g.name != name);
    Ok(generations.len() != before)
  }

  async fn match_request(
    &self,
    identity: &RequestIdentity,
    scope: CacheScope<'_>,
  ) -> Result<Option<CachedResponse>> {
    let generations = self.lock()?;
    let key = identity.cache_key();

    let found = generations
      .iter()
      .filter(|g| match scope {
        CacheScope::All => true,
        CacheScope::Generation(name) => g.name == name,
      })
      .find_map(|g| g.entries.get(&key));

    Ok(found.cloned())
  }

  async fn put(&self, name: &str, identity: &RequestIdentity, response: Response) -> Result<()> {
    ensure_storable(identity, &response)?;

    let mut generations = self.lock()?;
    let generation = find_or_create(&mut generations, name);
    generation.entries.insert(
      identity.cache_key(),
      CachedResponse {
        response,
        stored_at: Utc::now(),
      },
    );
    Ok(())
  }

  async fn entry_count(&self, name: &str) -> Result<usize> {
    let generations = self.lock()?;
    Ok(
      generations
        .iter()
        .find(|g| g.name == name)
        .map(|g| g.entries.len())
        .unwrap_or(0),
    )
  }

  async fn latest_write(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
    let generations = self.lock()?;
    Ok(
      generations
        .iter()
        .find(|g| g.name == name)
        .and_then(|g| g.entries.values().map(|entry| entry.stored_at).max()),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  fn identity(s: &str) -> RequestIdentity {
    RequestIdentity::get(Url::parse(s).unwrap())
  }

  #[tokio::test]
  async fn test_put_then_match_round_trip() {
    let store = MemoryStore::new();
    let id = identity("https://app.example/app.js");
    let response = Response::new(200, vec![("x-a".into(), "1".into())], "body");

    store.put("dyn", &id, response.clone()).await.unwrap();

    let hit = store
      .match_request(&id, CacheScope::Generation("dyn"))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(hit.response.status, response.status);
    assert_eq!(hit.response.body, response.body);
  }

  #[tokio::test]
  async fn test_put_overwrites_same_identity() {
    let store = MemoryStore::new();
    let id = identity("https://app.example/data");

    store.put("dyn", &id, Response::new(200, vec![], "old")).await.unwrap();
    store.put("dyn", &id, Response::new(200, vec![], "new")).await.unwrap();

    assert_eq!(store.entry_count("dyn").await.unwrap(), 1);
    let hit = store.match_request(&id, CacheScope::All).await.unwrap().unwrap();
    assert_eq!(&hit.response.body[..], b"new");
  }

  #[tokio::test]
  async fn test_match_all_uses_creation_order() {
    let store = MemoryStore::new();
    let id = identity("https://app.example/");
    store.open("static").await.unwrap();
    store.put("dynamic", &id, Response::new(200, vec![], "dynamic")).await.unwrap();
    store.put("static", &id, Response::new(200, vec![], "static")).await.unwrap();

    let hit = store.match_request(&id, CacheScope::All).await.unwrap().unwrap();
    assert_eq!(&hit.response.body[..], b"static");
  }

  #[tokio::test]
  async fn test_match_single_generation_ignores_others() {
    let store = MemoryStore::new();
    let id = identity("https://app.example/");
    store.put("static", &id, Response::new(200, vec![], "shell")).await.unwrap();

    let miss = store
      .match_request(&id, CacheScope::Generation("dynamic"))
      .await
      .unwrap();
    assert!(miss.is_none());
  }

  #[tokio::test]
  async fn test_delete_removes_generation() {
    let store = MemoryStore::new();
    store.open("a").await.unwrap();
    store.open("b").await.unwrap();

    assert!(store.delete("a").await.unwrap());
    assert!(!store.delete("a").await.unwrap());
    assert_eq!(store.keys().await.unwrap(), vec!["b".to_string()]);
  }

  #[tokio::test]
  async fn test_latest_write_tracks_most_recent_put() {
    let store = MemoryStore::new();
    store.open("dyn").await.unwrap();
    assert!(store.latest_write("dyn").await.unwrap().is_none());
    assert!(store.latest_write("missing").await.unwrap().is_none());

    let before = Utc::now();
    store
      .put("dyn", &identity("https://app.example/a"), Response::new(200, vec![], "a"))
      .await
      .unwrap();
    store
      .put("dyn", &identity("https://app.example/b"), Response::new(200, vec![], "b"))
      .await
      .unwrap();

    let latest = store.latest_write("dyn").await.unwrap().unwrap();
    assert!(latest >= before);
    assert!(latest <= Utc::now());
  }

  #[tokio::test]
  async fn test_rejects_uncacheable_writes() {
    let store = MemoryStore::new();
    let url = Url::parse("https://app.example/submit").unwrap();
    let post = RequestIdentity::new(Method::POST, url.clone());
    let get = RequestIdentity::get(url);

    assert!(store.put("dyn", &post, Response::new(200, vec![], "")).await.is_err());
    assert!(store.put("dyn", &get, Response::new(206, vec![], "")).await.is_err());
    assert!(store.put("dyn", &get, Response::error()).await.is_err());
    assert_eq!(store.entry_count("dyn").await.unwrap(), 0);
  }
}
