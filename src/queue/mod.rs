//! Durable offline write queue.
//!
//! Writes attempted without connectivity are parked here and replayed in
//! FIFO order once the network comes back. The whole queue is persisted as
//! one JSON-encoded array under a single well-known key, so the stored
//! value is always a valid (possibly empty) sequence and relative order
//! survives process restarts.

mod store;

pub use store::{QueueStore, SqliteQueueStore};

use serde::{Deserialize, Serialize};

/// A deferred write. Identity is its position in the queue; the server
/// assigns id and date when the item is finally replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedItem {
  pub content: String,
}

impl QueuedItem {
  pub fn new(content: impl Into<String>) -> Self {
    Self {
      content: content.into(),
    }
  }
}
