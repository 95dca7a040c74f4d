//! Connectivity detection.
//!
//! The queue manager never talks to a browser-style global flag directly;
//! it is handed a `Connectivity` capability. The production implementation
//! is a shared last-known-status flag kept up to date by the connectivity
//! watcher (see `event`), which means a reading can be stale: a false
//! "online" makes a replay attempt fail and the item simply stays queued
//! until the next transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use url::Url;

/// Capability reporting whether the network is believed reachable.
pub trait Connectivity: Send + Sync {
  fn is_online(&self) -> bool;
}

/// Last-known connectivity status, shared between the watcher task that
/// updates it and everything that reads it.
#[derive(Clone, Default)]
pub struct SharedStatus {
  online: Arc<AtomicBool>,
}

impl SharedStatus {
  pub fn new(online: bool) -> Self {
    Self {
      online: Arc::new(AtomicBool::new(online)),
    }
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::Relaxed);
  }
}

impl Connectivity for SharedStatus {
  fn is_online(&self) -> bool {
    self.online.load(Ordering::Relaxed)
  }
}

/// Fixed status, for the `--offline` flag and for tests.
pub struct Forced(pub bool);

impl Connectivity for Forced {
  fn is_online(&self) -> bool {
    self.0
  }
}

/// One round trip against the server base URL to seed the status flag.
///
/// A `HEAD /` that yields any HTTP response at all counts as online; only
/// transport-level failure counts as offline. 4xx/5xx still proves the
/// network path works.
pub async fn probe(client: &reqwest::Client, base: &Url) -> bool {
  client
    .head(base.clone())
    .timeout(Duration::from_secs(5))
    .send()
    .await
    .is_ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shared_status_reports_updates() {
    let status = SharedStatus::new(false);
    assert!(!status.is_online());

    status.set_online(true);
    assert!(status.is_online());

    let handle = status.clone();
    handle.set_online(false);
    assert!(!status.is_online());
  }

  #[test]
  fn forced_status_is_fixed() {
    assert!(Forced(true).is_online());
    assert!(!Forced(false).is_online());
  }
}
