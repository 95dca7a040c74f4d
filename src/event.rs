//! Connectivity lifecycle events.
//!
//! A background task keeps the shared online flag current and reports
//! transitions; `watch` drains the offline queue whenever `Online` fires.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use url::Url;

use crate::net::{self, Connectivity, SharedStatus};

/// Events produced by the connectivity watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// Connectivity restored (offline -> online transition).
  Online,
  /// Connectivity lost (online -> offline transition).
  Offline,
  /// Periodic tick with no status change.
  Tick,
}

/// Watches connectivity and emits transition events.
pub struct ConnectivityWatcher {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl ConnectivityWatcher {
  /// Watch the server at `base` by probing it once per tick.
  pub fn new(base: Url, tick_rate: Duration, status: SharedStatus) -> Self {
    let client = reqwest::Client::new();
    Self::with_probe(
      move || {
        let client = client.clone();
        let base = base.clone();
        async move { net::probe(&client, &base).await }
      },
      tick_rate,
      status,
    )
  }

  /// Watch using a custom probe. Tests inject scripted probes here.
  pub fn with_probe<P, Fut>(probe: P, tick_rate: Duration, status: SharedStatus) -> Self
  where
    P: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
  {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut last = status.is_online();
      loop {
        tokio::time::sleep(tick_rate).await;

        let online = probe().await;
        status.set_online(online);

        let event = if online == last {
          Event::Tick
        } else {
          last = online;
          if online {
            Event::Online
          } else {
            Event::Offline
          }
        };

        if tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event.
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};
  use std::sync::Arc;

  #[tokio::test]
  async fn emits_transitions_and_updates_shared_status() {
    let reachable = Arc::new(AtomicBool::new(false));
    let status = SharedStatus::new(false);

    let probe_flag = reachable.clone();
    let mut watcher = ConnectivityWatcher::with_probe(
      move || {
        let flag = probe_flag.clone();
        async move { flag.load(Ordering::SeqCst) }
      },
      Duration::from_millis(5),
      status.clone(),
    );

    // Still offline: first events are plain ticks.
    assert_eq!(watcher.next().await, Some(Event::Tick));
    assert!(!status.is_online());

    // Server comes back: the next non-tick event is Online.
    reachable.store(true, Ordering::SeqCst);
    loop {
      match watcher.next().await.unwrap() {
        Event::Tick => continue,
        event => {
          assert_eq!(event, Event::Online);
          break;
        }
      }
    }
    assert!(status.is_online());

    // And drops again: Offline.
    reachable.store(false, Ordering::SeqCst);
    loop {
      match watcher.next().await.unwrap() {
        Event::Tick => continue,
        event => {
          assert_eq!(event, Event::Offline);
          break;
        }
      }
    }
    assert!(!status.is_online());
  }
}
