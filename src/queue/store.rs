//! Queue persistence backends.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::QueuedItem;

/// Key the serialized queue lives under.
const QUEUE_KEY: &str = "reflection_queue";

/// Trait for queue storage backends.
///
/// The queue is read and written whole: it is small and human-paced (one
/// journal entry at a time), and whole-value replacement keeps the
/// persisted bytes a valid array at every point in time.
pub trait QueueStore: Send + Sync {
  /// Load the full queue, oldest first. A missing value is an empty queue.
  fn load(&self) -> Result<Vec<QueuedItem>>;

  /// Replace the persisted queue with `items`, preserving their order.
  fn save(&self, items: &[QueuedItem]) -> Result<()>;
}

/// SQLite-backed queue store: one key-value row holding the JSON array.
pub struct SqliteQueueStore {
  conn: Mutex<Connection>,
}

const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteQueueStore {
  /// Open or create the queue database at the default location.
  pub fn open_default() -> Result<Self> {
    let path = default_path()?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create queue directory: {}", e))?;
    }

    Self::open(&path)
  }

  /// Open or create a queue database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open queue database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// In-memory store for tests.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory queue database: {}", e))?;

    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(QUEUE_SCHEMA)
      .map_err(|e| eyre!("Failed to run queue migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

fn default_path() -> Result<std::path::PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("refls").join("queue.db"))
}

impl QueueStore for SqliteQueueStore {
  fn load(&self) -> Result<Vec<QueuedItem>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let value: Option<Vec<u8>> = conn
      .query_row(
        "SELECT value FROM kv WHERE key = ?",
        params![QUEUE_KEY],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read queue: {}", e))?;

    match value {
      Some(bytes) => {
        serde_json::from_slice(&bytes).map_err(|e| eyre!("Corrupt queue value: {}", e))
      }
      None => Ok(Vec::new()),
    }
  }

  fn save(&self, items: &[QueuedItem]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let bytes =
      serde_json::to_vec(items).map_err(|e| eyre!("Failed to serialize queue: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![QUEUE_KEY, bytes],
      )
      .map_err(|e| eyre!("Failed to write queue: {}", e))?;

    Ok(())
  }
}
