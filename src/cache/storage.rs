//! SQLite-backed cache store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::{ensure_storable, CacheScope, CacheStore, CachedResponse};
use crate::http::{RequestIdentity, Response};

/// Persistent cache store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Store that disappears when dropped.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    Ok(crate::config::data_dir()?.join("cache.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Generations, id preserves creation order
CREATE TABLE IF NOT EXISTS generations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- One row per request identity per generation
CREATE TABLE IF NOT EXISTS entries (
    generation TEXT NOT NULL,
    request_key TEXT NOT NULL,
    request TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, request_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_key ON entries(request_key);
"#;

type EntryRow = (u16, String, Vec<u8>, String);

fn decode_entry((status, headers, body, stored_at): EntryRow) -> Result<CachedResponse> {
  let headers: Vec<(String, String)> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;

  Ok(CachedResponse {
    response: Response::new(status, headers, body),
    stored_at: parse_datetime(&stored_at)?,
  })
}

#[async_trait]
impl CacheStore for SqliteStore {
  async fn open(&self, name: &str) -> Result<()> {
    self
      .lock()?
      .execute(
        "INSERT OR IGNORE INTO generations (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to open generation {}: {}", name, e))?;
    Ok(())
  }

  async fn keys(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM generations ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read generation name: {}", e))?;

    Ok(names)
  }

  async fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM entries WHERE generation = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;
    let removed = tx
      .execute("DELETE FROM generations WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete generation {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  async fn match_request(
    &self,
    identity: &RequestIdentity,
    scope: CacheScope<'_>,
  ) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;
    let key = identity.cache_key();
    let read = |row: &rusqlite::Row<'_>| -> rusqlite::Result<EntryRow> {
      Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    };

    let row = match scope {
      CacheScope::All => conn
        .query_row(
          "SELECT e.status, e.headers, e.body, e.stored_at FROM entries e
           INNER JOIN generations g ON g.name = e.generation
           WHERE e.request_key = ?
           ORDER BY g.id
           LIMIT 1",
          params![key],
          read,
        )
        .optional(),
      CacheScope::Generation(name) => conn
        .query_row(
          "SELECT status, headers, body, stored_at FROM entries
           WHERE generation = ? AND request_key = ?",
          params![name, key],
          read,
        )
        .optional(),
    }
    .map_err(|e| eyre!("Failed to look up {}: {}", identity, e))?;

    row.map(decode_entry).transpose()
  }

  async fn put(&self, name: &str, identity: &RequestIdentity, response: Response) -> Result<()> {
    ensure_storable(identity, &response)?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO generations (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to open generation {}: {}", name, e))?;

    tx.execute(
      "INSERT OR REPLACE INTO entries
         (generation, request_key, request, status, headers, body, stored_at)
       VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        name,
        identity.cache_key(),
        identity.to_string(),
        response.status,
        headers,
        &response.body[..]
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", identity, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  async fn entry_count(&self, name: &str) -> Result<usize> {
    let count: i64 = self
      .lock()?
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE generation = ?",
        params![name],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", name, e))?;

    Ok(usize::try_from(count).unwrap_or(0))
  }

  async fn latest_write(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
    let latest: Option<String> = self
      .lock()?
      .query_row(
        "SELECT MAX(stored_at) FROM entries WHERE generation = ?",
        params![name],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to read last write of {}: {}", name, e))?;

    latest.as_deref().map(parse_datetime).transpose()
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
