//! Cache storage: named generation buckets of URL-keyed response entries,
//! plus the registry recording which generation is current.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub url: String,
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn new(url: &str, status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
    Self {
      url: url.to_string(),
      status,
      content_type,
      body,
      fetched_at: Utc::now(),
    }
  }
}

/// Trait for cache storage backends.
pub trait CacheStore: Send + Sync {
  /// Create the bucket if it does not exist yet.
  fn ensure_bucket(&self, name: &str) -> Result<()>;

  /// Look up the entry for a URL in a bucket.
  fn get(&self, bucket: &str, url: &str) -> Result<Option<CacheEntry>>;

  /// Store an entry, replacing any previous entry for the same URL.
  fn put(&self, bucket: &str, entry: &CacheEntry) -> Result<()>;

  /// Names of all existing buckets.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Delete a bucket and all its entries.
  fn delete_bucket(&self, name: &str) -> Result<()>;

  /// The generation currently recorded as active, if any.
  fn current_generation(&self) -> Result<Option<String>>;

  /// Make `name` the current generation. Every other bucket is deleted in
  /// the same transaction, so "exactly one current generation, rest
  /// purged" holds structurally rather than by naming convention.
  fn set_current_generation(&self, name: &str) -> Result<()>;

  /// Number of entries in a bucket.
  fn entry_count(&self, bucket: &str) -> Result<usize>;
}

/// SQLite-based cache store.
pub struct SqliteCacheStore {
  conn: Mutex<Connection>,
}

const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS entries (
    bucket TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, request_key),
    FOREIGN KEY (bucket) REFERENCES buckets(name) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const CURRENT_GENERATION_KEY: &str = "current_generation";

impl SqliteCacheStore {
  /// Open or create the cache database at the default location.
  pub fn open_default() -> Result<Self> {
    let path = default_path()?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    Self::open(&path)
  }

  /// Open or create a cache database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// In-memory store for tests.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn default_path() -> Result<std::path::PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("refls").join("cache.db"))
}

/// SHA256 hash of the URL, for stable fixed-length entry keys.
fn request_key(url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hex::encode(hasher.finalize())
}

impl CacheStore for SqliteCacheStore {
  fn ensure_bucket(&self, name: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR IGNORE INTO buckets (name) VALUES (?)",
        params![name],
      )
      .map_err(|e| eyre!("Failed to create bucket {}: {}", name, e))?;

    Ok(())
  }

  fn get(&self, bucket: &str, url: &str) -> Result<Option<CacheEntry>> {
    let conn = self.lock()?;

    let row: Option<(u16, Option<String>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, content_type, body, fetched_at FROM entries
         WHERE bucket = ? AND request_key = ?",
        params![bucket, request_key(url)],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    match row {
      Some((status, content_type, body, fetched_at_str)) => Ok(Some(CacheEntry {
        url: url.to_string(),
        status,
        content_type,
        body,
        fetched_at: parse_datetime(&fetched_at_str)?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, bucket: &str, entry: &CacheEntry) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries
           (bucket, request_key, url, status, content_type, body, fetched_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          bucket,
          request_key(&entry.url),
          entry.url,
          entry.status,
          entry.content_type,
          entry.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM buckets ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare bucket query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_bucket(&self, name: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM buckets WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", name, e))?;

    Ok(())
  }

  fn current_generation(&self) -> Result<Option<String>> {
    let conn = self.lock()?;

    conn
      .query_row(
        "SELECT value FROM meta WHERE key = ?",
        params![CURRENT_GENERATION_KEY],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read current generation: {}", e))
  }

  fn set_current_generation(&self, name: &str) -> Result<()> {
    let mut conn = self.lock()?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT OR IGNORE INTO buckets (name) VALUES (?)",
      params![name],
    )
    .map_err(|e| eyre!("Failed to create bucket {}: {}", name, e))?;

    tx.execute("DELETE FROM buckets WHERE name != ?", params![name])
      .map_err(|e| eyre!("Failed to purge stale buckets: {}", e))?;

    tx.execute(
      "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
      params![CURRENT_GENERATION_KEY, name],
    )
    .map_err(|e| eyre!("Failed to record current generation: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn entry_count(&self, bucket: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries WHERE bucket = ?",
        params![bucket],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries: {}", e))?;

    Ok(count as usize)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
