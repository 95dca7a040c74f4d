//! Cache worker: lifecycle plus per-route caching strategies.
//!
//! A worker generation moves through install (pre-cache the app shell),
//! activate (become the single current generation, purging the rest) and
//! then handles requests. Requests under the reflections-API prefix are
//! network-first so lists stay fresh when online; everything else is
//! cache-first so the shell keeps loading offline.

use std::sync::Arc;

use color_eyre::{eyre::bail, eyre::eyre, Result};
use futures::future::try_join_all;
use reqwest::Method;
use tracing::{debug, info, warn};
use url::Url;

use super::fetch::{FetchedResponse, Fetcher, Request, ResponseSource};
use super::store::{CacheEntry, CacheStore};

/// Lifecycle state of a worker generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Created but the shell is not pre-cached yet.
  Installing,
  /// Shell pre-cached, waiting for activation.
  Installed,
  /// Current generation, handling requests.
  Active,
}

/// One generation of the asset/response cache.
pub struct CacheWorker {
  generation: String,
  state: WorkerState,
  base: Url,
  /// Paths pre-cached during install (the app shell).
  shell: Vec<String>,
  /// URL path prefix routed network-first.
  api_prefix: String,
  store: Arc<dyn CacheStore>,
  fetcher: Arc<dyn Fetcher>,
}

impl CacheWorker {
  pub fn new(
    generation: String,
    base: Url,
    shell: Vec<String>,
    api_prefix: String,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Self {
    Self {
      generation,
      state: WorkerState::Installing,
      base,
      shell,
      api_prefix,
      store,
      fetcher,
    }
  }

  /// Adopt an already-current generation without re-installing, as when
  /// the configured cache version has not changed since the last run.
  pub fn resume(
    generation: String,
    base: Url,
    api_prefix: String,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Self {
    Self {
      generation,
      state: WorkerState::Active,
      base,
      shell: Vec::new(),
      api_prefix,
      store,
      fetcher,
    }
  }

  #[allow(dead_code)]
  pub fn generation(&self) -> &str {
    &self.generation
  }

  #[allow(dead_code)]
  pub fn state(&self) -> WorkerState {
    self.state
  }

  /// Pre-cache the app shell into this generation's bucket.
  ///
  /// All shell paths are fetched concurrently; if any fails the partial
  /// bucket is discarded and the generation never activates, leaving the
  /// previous generation current.
  pub async fn install(&mut self) -> Result<()> {
    if self.state != WorkerState::Installing {
      bail!("install called on a {} worker", self.state_name());
    }

    self.store.ensure_bucket(&self.generation)?;

    let fetches = self.shell.iter().map(|path| {
      let fetcher = Arc::clone(&self.fetcher);
      let url = self.shell_url(path);
      async move {
        let resp = fetcher.fetch(&Request::get(url.clone())).await?;
        if !resp.is_success() {
          return Err(eyre!("Shell fetch for {} returned HTTP {}", url, resp.status));
        }
        Ok::<_, color_eyre::Report>((url, resp))
      }
    });

    match try_join_all(fetches).await {
      Ok(responses) => {
        for (url, resp) in responses {
          let entry = CacheEntry::new(url.as_str(), resp.status, resp.content_type, resp.body);
          self.store.put(&self.generation, &entry)?;
        }
        info!(generation = %self.generation, assets = self.shell.len(), "shell pre-cached");
        self.state = WorkerState::Installed;
        Ok(())
      }
      Err(e) => {
        warn!(generation = %self.generation, error = %e, "install aborted");
        self.store.delete_bucket(&self.generation)?;
        Err(e)
      }
    }
  }

  /// Make this generation current, purging every other bucket, and start
  /// handling requests immediately.
  pub async fn activate(&mut self) -> Result<()> {
    if self.state != WorkerState::Installed {
      bail!("activate called on a {} worker", self.state_name());
    }

    self.store.set_current_generation(&self.generation)?;
    self.state = WorkerState::Active;
    info!(generation = %self.generation, "cache generation activated");
    Ok(())
  }

  /// Handle a request with the strategy its route calls for.
  ///
  /// Non-GET requests pass straight through to the network with errors
  /// propagated: a synthetic fallback in place of a failed write would
  /// make the caller believe the write landed.
  pub async fn handle(&self, req: &Request) -> Result<FetchedResponse> {
    if self.state != WorkerState::Active {
      bail!("worker for {} is not active", self.generation);
    }

    if req.method != Method::GET {
      return self.fetcher.fetch(req).await;
    }

    if req.url.path().starts_with(&self.api_prefix) {
      self.network_first(req).await
    } else {
      self.cache_first(req).await
    }
  }

  /// Cached entry wins; the network is only consulted on a miss. A miss
  /// that also fails on the network degrades to a plain-text placeholder
  /// rather than an error.
  async fn cache_first(&self, req: &Request) -> Result<FetchedResponse> {
    if let Some(entry) = self.store.get(&self.generation, req.url.as_str())? {
      debug!(url = %req.url, "cache-first hit");
      return Ok(response_from_entry(entry));
    }

    match self.fetcher.fetch(req).await {
      Ok(resp) => {
        self.store_if_cacheable(req, &resp)?;
        Ok(resp)
      }
      Err(e) => {
        debug!(url = %req.url, error = %e, "cache-first fallback");
        Ok(offline_placeholder())
      }
    }
  }

  /// Live response wins and refreshes the cache; on failure fall back to
  /// the cached entry, or to an empty JSON list when there is none.
  async fn network_first(&self, req: &Request) -> Result<FetchedResponse> {
    match self.fetcher.fetch(req).await {
      Ok(resp) => {
        self.store_if_cacheable(req, &resp)?;
        Ok(resp)
      }
      Err(e) => {
        debug!(url = %req.url, error = %e, "network-first falling back to cache");
        match self.store.get(&self.generation, req.url.as_str())? {
          Some(entry) => Ok(response_from_entry(entry)),
          None => Ok(empty_list_fallback()),
        }
      }
    }
  }

  fn store_if_cacheable(&self, req: &Request, resp: &FetchedResponse) -> Result<()> {
    if resp.is_success() {
      let entry = CacheEntry::new(
        req.url.as_str(),
        resp.status,
        resp.content_type.clone(),
        resp.body.clone(),
      );
      self.store.put(&self.generation, &entry)?;
    }
    Ok(())
  }

  fn shell_url(&self, path: &str) -> Url {
    let mut url = self.base.clone();
    url.set_path(path);
    url
  }

  fn state_name(&self) -> &'static str {
    match self.state {
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Active => "active",
    }
  }
}

fn response_from_entry(entry: CacheEntry) -> FetchedResponse {
  FetchedResponse {
    status: entry.status,
    content_type: entry.content_type,
    body: entry.body,
    source: ResponseSource::Cache,
  }
}

/// Placeholder for assets never seen while online.
fn offline_placeholder() -> FetchedResponse {
  FetchedResponse {
    status: 200,
    content_type: Some("text/plain".into()),
    body: b"Offline and not cached yet.".to_vec(),
    source: ResponseSource::Fallback,
  }
}

/// Empty listing so callers expecting a JSON list keep working offline.
fn empty_list_fallback() -> FetchedResponse {
  FetchedResponse {
    status: 200,
    content_type: Some("application/json".into()),
    body: b"[]".to_vec(),
    source: ResponseSource::Fallback,
  }
}
