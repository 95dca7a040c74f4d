//! Application wiring and CLI command handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use color_eyre::{
  eyre::{bail, eyre},
  Result,
};
use tracing::{info, warn};

use crate::api::{HttpClient, Reflection, ReflectionsApi, ReflectionsDoc};
use crate::cache::{
  CacheStore, CacheWorker, Fetcher, HttpFetcher, Request, ResponseSource, SqliteCacheStore,
};
use crate::config::Config;
use crate::event::{ConnectivityWatcher, Event};
use crate::net::{self, Connectivity, Forced, SharedStatus};
use crate::queue::SqliteQueueStore;
use crate::sync::{QueuedReason, SubmitOutcome, SyncManager};

/// Minimum reflection length, matching what the server enforces. Checked
/// here so a too-short reflection fails inline instead of reaching the
/// submit path.
const MIN_REFLECTION_CHARS: usize = 10;

/// Application state shared by all CLI commands.
pub struct App {
  config: Config,
  status: SharedStatus,
  api: Arc<HttpClient>,
  manager: SyncManager,
  store: Arc<SqliteCacheStore>,
  /// Lazily bootstrapped: only commands that read through the cache pay
  /// for install/activate.
  worker: Option<CacheWorker>,
}

impl App {
  pub async fn new(config: Config, force_offline: bool) -> Result<Self> {
    let base = config.base_url()?;
    let api = Arc::new(HttpClient::new(base.clone(), &config.server.api_prefix));

    let queue = Arc::new(SqliteQueueStore::open_default()?);
    let store = Arc::new(SqliteCacheStore::open_default()?);

    let status = SharedStatus::new(false);
    let connectivity: Arc<dyn Connectivity> = if force_offline {
      Arc::new(Forced(false))
    } else {
      let probe_client = reqwest::Client::new();
      status.set_online(net::probe(&probe_client, &base).await);
      Arc::new(status.clone())
    };

    let manager = SyncManager::new(api.clone(), queue, connectivity);

    Ok(Self {
      config,
      status,
      api,
      manager,
      store,
      worker: None,
    })
  }

  /// Fetch and print the reflections listing, newest first. An optional
  /// keyword narrows by content (case-insensitive) and an optional date
  /// narrows to entries from that exact day.
  pub async fn list(&mut self, search: Option<&str>, date: Option<&str>) -> Result<()> {
    let url = self.api.collection_url();
    let worker = self.ensure_worker().await?;
    let resp = worker.handle(&Request::get(url)).await?;

    match resp.source {
      ResponseSource::Network => {}
      ResponseSource::Cache => println!("(offline: showing cached reflections)"),
      ResponseSource::Fallback => println!("(offline: no cached reflections)"),
    }

    let reflections = sort_newest_first(apply_filters(parse_listing(&resp.body)?, search, date));
    if reflections.is_empty() {
      println!("No reflections found.");
      return Ok(());
    }

    for r in &reflections {
      println!("#{:<5} {}", r.id, r.date);
      println!("       {}", r.content);
    }
    println!(
      "{} reflection{} total",
      reflections.len(),
      if reflections.len() == 1 { "" } else { "s" }
    );

    Ok(())
  }

  /// Validate and submit a new reflection.
  pub async fn add(&self, content: &str) -> Result<()> {
    let content = content.trim();
    if content.is_empty() {
      bail!("Please write something.");
    }
    if content.chars().count() < MIN_REFLECTION_CHARS {
      bail!(
        "Reflection must be at least {} characters.",
        MIN_REFLECTION_CHARS
      );
    }

    match self.manager.submit(content).await? {
      SubmitOutcome::Saved(r) => println!("Reflection #{} saved.", r.id),
      SubmitOutcome::Queued(QueuedReason::Offline) => {
        println!("You appear to be offline. Reflection queued; run `refls sync` once connected.")
      }
      SubmitOutcome::Queued(QueuedReason::Unreachable) => {
        println!("Could not reach the server. Reflection queued; run `refls sync` once connected.")
      }
    }

    Ok(())
  }

  /// Delete a reflection by id.
  pub async fn delete(&self, id: u64) -> Result<()> {
    self.api.delete(id).await?;
    println!("Deleted reflection #{}.", id);
    Ok(())
  }

  /// Replay the offline queue once.
  pub async fn sync(&self) -> Result<()> {
    let report = self.manager.drain().await?;
    if report.is_empty() {
      println!("Queue is empty, nothing to sync.");
    } else {
      println!(
        "Replayed {} reflection(s), {} still queued.",
        report.replayed, report.remaining
      );
    }
    Ok(())
  }

  /// Print connectivity, queue, and cache state.
  pub async fn status(&self) -> Result<()> {
    println!("Server:  {}", self.config.server.url);
    println!(
      "Online:  {}",
      if self.status.is_online() { "yes" } else { "no" }
    );

    let queued = self.manager.queued().await?;
    println!("Queued:  {} reflection(s)", queued.len());
    for (i, item) in queued.iter().enumerate() {
      println!("  {}. {}", i + 1, preview(&item.content));
    }

    let buckets = bucket_summaries(self.store.as_ref())?;
    if buckets.is_empty() {
      println!("Cache:   not installed");
    } else {
      println!("Cache:");
      for (name, entries, current) in buckets {
        println!(
          "  {} ({} entries){}",
          name,
          entries,
          if current { " [current]" } else { "" }
        );
      }
    }

    Ok(())
  }

  /// Watch connectivity, replaying the queue whenever it comes back.
  pub async fn watch(&mut self, tick_rate: Duration) -> Result<()> {
    let base = self.config.base_url()?;
    let mut watcher = ConnectivityWatcher::new(base, tick_rate, self.status.clone());

    println!("Watching connectivity; queued reflections replay automatically. Ctrl-C to stop.");

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        event = watcher.next() => match event {
          Some(Event::Online) => {
            info!("connectivity restored");
            println!("Back online, replaying queue...");
            let report = self.manager.drain().await?;
            println!(
              "Replayed {} reflection(s), {} still queued.",
              report.replayed, report.remaining
            );
          }
          Some(Event::Offline) => {
            info!("connectivity lost");
            println!("Offline. New reflections will be queued.");
          }
          Some(Event::Tick) => {}
          None => break,
        },
      }
    }

    Ok(())
  }

  async fn ensure_worker(&mut self) -> Result<&CacheWorker> {
    if self.worker.is_none() {
      self.worker = Some(self.bootstrap_worker().await?);
    }
    self
      .worker
      .as_ref()
      .ok_or_else(|| eyre!("cache worker unavailable"))
  }

  /// Install/activate the configured cache generation, or resume the one
  /// already current. An install failure keeps the previous generation
  /// active, as a new worker version would in a browser.
  async fn bootstrap_worker(&self) -> Result<CacheWorker> {
    let base = self.config.base_url()?;
    let generation = self.config.generation();
    let api_prefix = self.config.server.api_prefix.clone();
    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new());
    let store: Arc<dyn CacheStore> = self.store.clone();

    let current = self.store.current_generation()?;
    if current.as_deref() == Some(generation.as_str()) {
      return Ok(CacheWorker::resume(
        generation, base, api_prefix, store, fetcher,
      ));
    }

    let mut worker = CacheWorker::new(
      generation,
      base.clone(),
      self.config.cache.shell.clone(),
      api_prefix.clone(),
      store.clone(),
      fetcher.clone(),
    );

    match worker.install().await {
      Ok(()) => {
        worker.activate().await?;
        Ok(worker)
      }
      Err(e) => match current {
        Some(previous) => {
          warn!(error = %e, generation = %previous, "install failed, resuming previous generation");
          Ok(CacheWorker::resume(
            previous, base, api_prefix, store, fetcher,
          ))
        }
        None => Err(e),
      },
    }
  }
}

/// Parse a listing body: either the full `{"reflections": [...]}` document
/// or the bare-array fallback the cache worker synthesizes offline.
fn parse_listing(body: &[u8]) -> Result<Vec<Reflection>> {
  if let Ok(doc) = serde_json::from_slice::<ReflectionsDoc>(body) {
    return Ok(doc.reflections);
  }
  serde_json::from_slice::<Vec<Reflection>>(body)
    .map_err(|e| eyre!("Unexpected listing body: {}", e))
}

/// Summarize every cache bucket as (name, entry count, is current).
fn bucket_summaries(store: &dyn CacheStore) -> Result<Vec<(String, usize, bool)>> {
  let current = store.current_generation()?;
  let mut summaries = Vec::new();
  for name in store.bucket_names()? {
    let entries = store.entry_count(&name)?;
    let is_current = current.as_deref() == Some(name.as_str());
    summaries.push((name, entries, is_current));
  }
  Ok(summaries)
}

/// Narrow a listing by keyword and/or date, mirroring the filters the
/// server-side listing page offers.
fn apply_filters(
  mut reflections: Vec<Reflection>,
  search: Option<&str>,
  date: Option<&str>,
) -> Vec<Reflection> {
  if let Some(keyword) = search {
    let keyword = keyword.to_lowercase();
    reflections.retain(|r| r.content.to_lowercase().contains(&keyword));
  }
  if let Some(date) = date {
    reflections.retain(|r| r.date == date);
  }
  reflections
}

fn sort_newest_first(mut reflections: Vec<Reflection>) -> Vec<Reflection> {
  reflections.sort_by(|a, b| {
    parse_date(&b.date)
      .cmp(&parse_date(&a.date))
      .then(b.id.cmp(&a.id))
  });
  reflections
}

fn parse_date(s: &str) -> NaiveDate {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or(NaiveDate::MIN)
}

fn preview(content: &str) -> String {
  const MAX: usize = 60;
  if content.chars().count() <= MAX {
    content.to_string()
  } else {
    let head: String = content.chars().take(MAX).collect();
    format!("{}...", head)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn reflection(id: u64, date: &str, content: &str) -> Reflection {
    Reflection {
      id,
      date: date.to_string(),
      content: content.to_string(),
    }
  }

  #[test]
  fn parse_listing_accepts_the_document_shape() {
    let body = br#"{"reflections":[{"id":1,"date":"2026-08-27","content":"hello world"}]}"#;
    let parsed = parse_listing(body).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].content, "hello world");
  }

  #[test]
  fn parse_listing_accepts_the_offline_fallback() {
    assert!(parse_listing(b"[]").unwrap().is_empty());
  }

  #[test]
  fn parse_listing_rejects_garbage() {
    assert!(parse_listing(b"<html>error page</html>").is_err());
  }

  #[test]
  fn listing_sorts_newest_first_then_by_id() {
    let sorted = sort_newest_first(vec![
      reflection(1, "2026-08-20", "oldest"),
      reflection(3, "2026-08-27", "same day, later"),
      reflection(2, "2026-08-27", "same day, earlier"),
    ]);

    let ids: Vec<u64> = sorted.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
  }

  #[test]
  fn unparseable_dates_sort_last() {
    let sorted = sort_newest_first(vec![
      reflection(1, "not-a-date", "bad date"),
      reflection(2, "2026-08-27", "good date"),
    ]);
    assert_eq!(sorted[0].id, 2);
  }

  #[test]
  fn keyword_filter_matches_content_case_insensitively() {
    let filtered = apply_filters(
      vec![
        reflection(1, "2026-08-26", "Practiced Rust lifetimes"),
        reflection(2, "2026-08-27", "Went for a run"),
      ],
      Some("rust"),
      None,
    );
    let ids: Vec<u64> = filtered.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1]);
  }

  #[test]
  fn date_filter_matches_exact_day() {
    let filtered = apply_filters(
      vec![
        reflection(1, "2026-08-26", "first day"),
        reflection(2, "2026-08-27", "second day"),
      ],
      None,
      Some("2026-08-27"),
    );
    let ids: Vec<u64> = filtered.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![2]);
  }

  #[test]
  fn keyword_and_date_filters_combine() {
    let filtered = apply_filters(
      vec![
        reflection(1, "2026-08-27", "rust in the morning"),
        reflection(2, "2026-08-27", "coffee in the morning"),
        reflection(3, "2026-08-26", "rust in the evening"),
      ],
      Some("RUST"),
      Some("2026-08-27"),
    );
    let ids: Vec<u64> = filtered.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1]);
  }

  #[test]
  fn no_filters_pass_everything_through() {
    let all = apply_filters(
      vec![
        reflection(1, "2026-08-26", "one"),
        reflection(2, "2026-08-27", "two"),
      ],
      None,
      None,
    );
    assert_eq!(all.len(), 2);
  }

  #[test]
  fn bucket_summaries_cover_every_bucket_and_mark_the_current_one() {
    let store = SqliteCacheStore::in_memory().unwrap();
    store.ensure_bucket("refls-cache-v1").unwrap();
    store.ensure_bucket("refls-cache-v2").unwrap();
    store.set_current_generation("refls-cache-v2").unwrap();

    let summaries = bucket_summaries(&store).unwrap();

    // v1 was purged when v2 became current; only v2 remains, marked current.
    assert_eq!(summaries, vec![("refls-cache-v2".to_string(), 0, true)]);
  }

  #[test]
  fn bucket_summaries_without_a_current_generation() {
    let store = SqliteCacheStore::in_memory().unwrap();
    store.ensure_bucket("refls-cache-v1").unwrap();

    let summaries = bucket_summaries(&store).unwrap();

    assert_eq!(summaries, vec![("refls-cache-v1".to_string(), 0, false)]);
  }

  #[test]
  fn preview_truncates_long_content() {
    let long = "x".repeat(100);
    let p = preview(&long);
    assert_eq!(p.chars().count(), 63);
    assert!(p.ends_with("..."));

    assert_eq!(preview("short"), "short");
  }
}
