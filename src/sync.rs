//! Offline queue manager.
//!
//! Guarantees that a user-initiated write is never silently lost to a lack
//! of connectivity: writes attempted while offline (or that fail at the
//! transport level while nominally online) are parked in the durable queue
//! and replayed in FIFO order when connectivity returns.

use std::sync::Arc;

use color_eyre::Result;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::{Reflection, ReflectionsApi};
use crate::net::Connectivity;
use crate::queue::{QueueStore, QueuedItem};

/// What happened to a submitted write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// The server accepted the write.
  Saved(Reflection),
  /// The write is parked in the durable queue for later replay.
  Queued(QueuedReason),
}

/// Why a write was parked instead of saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuedReason {
  /// Connectivity was reported unavailable; no network call was made.
  Offline,
  /// The write was attempted but failed at the transport level.
  Unreachable,
}

/// Result of one drain pass over the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
  /// Items the server accepted during this pass.
  pub replayed: usize,
  /// Items still queued after the pass.
  pub remaining: usize,
}

impl DrainReport {
  pub fn is_empty(&self) -> bool {
    self.replayed == 0 && self.remaining == 0
  }
}

/// Coordinates writes between the API client and the durable queue.
pub struct SyncManager {
  api: Arc<dyn ReflectionsApi>,
  queue: Arc<dyn QueueStore>,
  connectivity: Arc<dyn Connectivity>,
  /// Serializes queue read-modify-write sections so a submit landing while
  /// a drain pass is rewriting the queue cannot be dropped.
  lock: Mutex<()>,
}

impl SyncManager {
  pub fn new(
    api: Arc<dyn ReflectionsApi>,
    queue: Arc<dyn QueueStore>,
    connectivity: Arc<dyn Connectivity>,
  ) -> Self {
    Self {
      api,
      queue,
      connectivity,
      lock: Mutex::new(()),
    }
  }

  /// Submit a reflection for creation.
  ///
  /// The caller has already validated the content (non-empty after trim,
  /// minimum length). Offline submissions are queued without a network
  /// call. Online submissions get one attempt; a transport-level failure
  /// is queued too, so the content stays on the offline-durability path,
  /// while a server rejection is surfaced to the caller untouched.
  pub async fn submit(&self, content: &str) -> Result<SubmitOutcome> {
    if !self.connectivity.is_online() {
      info!(len = content.len(), "offline, queueing reflection");
      self.enqueue(content).await?;
      return Ok(SubmitOutcome::Queued(QueuedReason::Offline));
    }

    match self.api.create(content).await {
      Ok(reflection) => Ok(SubmitOutcome::Saved(reflection)),
      Err(e) if e.is_connectivity() => {
        warn!(error = %e, "write failed in flight, queueing reflection");
        self.enqueue(content).await?;
        Ok(SubmitOutcome::Queued(QueuedReason::Unreachable))
      }
      Err(e) => Err(e.into()),
    }
  }

  /// Replay the queue in FIFO order.
  ///
  /// Every item gets one independent attempt even if an earlier one fails;
  /// the items written back are exactly the ordered subsequence that
  /// failed. There is no retry bound and no backoff within a pass.
  pub async fn drain(&self) -> Result<DrainReport> {
    let _guard = self.lock.lock().await;

    let items = self.queue.load()?;
    if items.is_empty() {
      return Ok(DrainReport {
        replayed: 0,
        remaining: 0,
      });
    }

    info!(queued = items.len(), "draining offline queue");

    let mut failed = Vec::new();
    let mut replayed = 0usize;

    for item in items {
      match self.api.create(&item.content).await {
        Ok(reflection) => {
          info!(id = reflection.id, "replayed queued reflection");
          replayed += 1;
        }
        Err(e) => {
          warn!(error = %e, "replay failed, keeping reflection queued");
          failed.push(item);
        }
      }
    }

    let remaining = failed.len();
    self.queue.save(&failed)?;

    Ok(DrainReport { replayed, remaining })
  }

  /// Number of items currently queued.
  pub async fn queued(&self) -> Result<Vec<QueuedItem>> {
    let _guard = self.lock.lock().await;
    self.queue.load()
  }

  async fn enqueue(&self, content: &str) -> Result<()> {
    let _guard = self.lock.lock().await;
    let mut items = self.queue.load()?;
    items.push(QueuedItem::new(content));
    self.queue.save(&items)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{ApiError, ApiResult};
  use crate::net::Forced;
  use crate::queue::SqliteQueueStore;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicU32, Ordering};

  /// Fake API that resolves creates based on markers in the content and
  /// counts every network attempt. "#fail" simulates a transport failure,
  /// "#reject" a server rejection. Accepted reflections are stored and
  /// come back from `list()`, like the real server.
  struct FakeApi {
    calls: AtomicU32,
    created: std::sync::Mutex<Vec<Reflection>>,
  }

  impl FakeApi {
    fn new() -> Self {
      Self {
        calls: AtomicU32::new(0),
        created: std::sync::Mutex::new(Vec::new()),
      }
    }

    fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl ReflectionsApi for FakeApi {
    async fn list(&self) -> ApiResult<Vec<Reflection>> {
      Ok(self.created.lock().unwrap().clone())
    }

    async fn create(&self, content: &str) -> ApiResult<Reflection> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if content.contains("#fail") {
        Err(ApiError::Network("connection refused".into()))
      } else if content.contains("#reject") {
        Err(ApiError::Rejected {
          status: 400,
          message: "Reflection must be at least 10 characters.".into(),
        })
      } else {
        let mut created = self.created.lock().unwrap();
        let reflection = Reflection {
          id: created.len() as u64 + 1,
          date: "2026-08-28".into(),
          content: content.to_string(),
        };
        created.push(reflection.clone());
        Ok(reflection)
      }
    }

    async fn delete(&self, _id: u64) -> ApiResult<()> {
      Ok(())
    }
  }

  fn manager(api: Arc<FakeApi>, online: bool) -> (SyncManager, Arc<SqliteQueueStore>) {
    let queue = Arc::new(SqliteQueueStore::in_memory().unwrap());
    let manager = SyncManager::new(api, queue.clone(), Arc::new(Forced(online)));
    (manager, queue)
  }

  #[tokio::test]
  async fn offline_submit_queues_without_network_call() {
    let api = Arc::new(FakeApi::new());
    let (manager, queue) = manager(api.clone(), false);

    let outcome = manager.submit("Today I learned testing.").await.unwrap();

    assert_eq!(outcome, SubmitOutcome::Queued(QueuedReason::Offline));
    assert_eq!(api.calls(), 0);
    assert_eq!(
      queue.load().unwrap(),
      vec![QueuedItem::new("Today I learned testing.")]
    );
  }

  #[tokio::test]
  async fn offline_submits_preserve_submission_order() {
    let api = Arc::new(FakeApi::new());
    let (manager, queue) = manager(api, false);

    manager.submit("first offline entry").await.unwrap();
    manager.submit("second offline entry").await.unwrap();
    manager.submit("third offline entry").await.unwrap();

    let contents: Vec<String> = queue
      .load()
      .unwrap()
      .into_iter()
      .map(|i| i.content)
      .collect();
    assert_eq!(
      contents,
      vec![
        "first offline entry",
        "second offline entry",
        "third offline entry"
      ]
    );
  }

  #[tokio::test]
  async fn online_submit_saves_without_queueing() {
    let api = Arc::new(FakeApi::new());
    let (manager, queue) = manager(api.clone(), true);

    let outcome = manager.submit("a fine day for journaling").await.unwrap();

    match outcome {
      SubmitOutcome::Saved(r) => assert_eq!(r.content, "a fine day for journaling"),
      other => panic!("expected Saved, got {:?}", other),
    }
    assert_eq!(api.calls(), 1);
    assert!(queue.load().unwrap().is_empty());
  }

  #[tokio::test]
  async fn online_transport_failure_lands_in_queue() {
    let api = Arc::new(FakeApi::new());
    let (manager, queue) = manager(api.clone(), true);

    let outcome = manager.submit("went dark mid-request #fail").await.unwrap();

    assert_eq!(outcome, SubmitOutcome::Queued(QueuedReason::Unreachable));
    assert_eq!(api.calls(), 1);
    assert_eq!(
      queue.load().unwrap(),
      vec![QueuedItem::new("went dark mid-request #fail")]
    );
  }

  #[tokio::test]
  async fn server_rejection_surfaces_and_is_not_queued() {
    let api = Arc::new(FakeApi::new());
    let (manager, queue) = manager(api, true);

    let err = manager.submit("too short #reject").await.unwrap_err();

    assert!(err.to_string().contains("at least 10 characters"));
    assert!(queue.load().unwrap().is_empty());
  }

  #[tokio::test]
  async fn drain_removes_successes_and_keeps_failures_in_order() {
    let api = Arc::new(FakeApi::new());
    let (manager, queue) = manager(api.clone(), true);

    queue
      .save(&[
        QueuedItem::new("keep me #fail one"),
        QueuedItem::new("replay me fine"),
        QueuedItem::new("keep me #fail two"),
        QueuedItem::new("also replays fine"),
      ])
      .unwrap();

    let report = manager.drain().await.unwrap();

    assert_eq!(report, DrainReport { replayed: 2, remaining: 2 });
    // Every item was attempted even though the first failed.
    assert_eq!(api.calls(), 4);
    // The survivors are exactly the failed items, in their original order.
    assert_eq!(
      queue.load().unwrap(),
      vec![
        QueuedItem::new("keep me #fail one"),
        QueuedItem::new("keep me #fail two"),
      ]
    );
  }

  #[tokio::test]
  async fn drain_of_empty_queue_is_a_noop() {
    let api = Arc::new(FakeApi::new());
    let (manager, _queue) = manager(api.clone(), true);

    let report = manager.drain().await.unwrap();

    assert!(report.is_empty());
    assert_eq!(api.calls(), 0);
  }

  #[tokio::test]
  async fn successful_drain_empties_the_queue() {
    let api = Arc::new(FakeApi::new());
    let (manager, queue) = manager(api, false);

    manager.submit("Today I learned testing.").await.unwrap();
    assert_eq!(queue.load().unwrap().len(), 1);

    // Connectivity restored: build a manager over the same queue that
    // believes it is online, as the watcher would after a transition.
    let api = Arc::new(FakeApi::new());
    let online = SyncManager::new(api.clone(), queue.clone(), Arc::new(Forced(true)));
    let report = online.drain().await.unwrap();

    assert_eq!(report, DrainReport { replayed: 1, remaining: 0 });
    assert!(queue.load().unwrap().is_empty());
    // The replayed reflection is now visible in the server listing.
    let listing = api.list().await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].content, "Today I learned testing.");
  }
}
