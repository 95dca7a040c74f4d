//! Request/response model and the network seam the cache worker fetches
//! through. Tests substitute counting fakes for `HttpFetcher`.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use url::Url;

/// An outgoing request as the cache worker sees it.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
    }
  }
}

/// Where a response handed back by the worker came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network.
  Network,
  /// Served from the current cache generation.
  Cache,
  /// Synthetic fallback, nothing live or cached was available.
  Fallback,
}

/// A response in the worker's terms: status, media type, raw body.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl FetchedResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  #[allow(dead_code)]
  pub fn body_text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Trait for performing live fetches.
#[async_trait]
pub trait Fetcher: Send + Sync {
  /// Perform the request. `Err` means a transport-level failure; an HTTP
  /// error status comes back as `Ok` with that status.
  async fn fetch(&self, req: &Request) -> Result<FetchedResponse>;
}

/// Fetcher backed by reqwest.
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
    }
  }
}

impl Default for HttpFetcher {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, req: &Request) -> Result<FetchedResponse> {
    let resp = self
      .client
      .request(req.method.clone(), req.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", req.url, e))?;

    let status = resp.status().as_u16();
    let content_type = resp
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);

    let body = resp
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", req.url, e))?
      .to_vec();

    Ok(FetchedResponse {
      status,
      content_type,
      body,
      source: ResponseSource::Network,
    })
  }
}
