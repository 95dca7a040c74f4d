//! Client for the reflections journal API.
//!
//! The server exposes list/create/delete over reflection records. The
//! `ReflectionsApi` trait is the seam the sync manager and the app work
//! against; `HttpClient` is the real implementation, tests use fakes.

pub mod client;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use client::HttpClient;
pub use types::{Reflection, ReflectionsDoc};

/// Errors from the reflections API.
///
/// The sync manager branches on the class of failure: `Network` means the
/// write never reached the server and is safe to queue for replay, while
/// `Rejected` and `Decode` mean the server saw the request, so replaying
/// could double-post.
#[derive(Debug, Error)]
pub enum ApiError {
  /// The server answered with a non-success status.
  #[error("server rejected request: {message}")]
  Rejected { status: u16, message: String },

  /// Transport-level failure (connect, timeout, dns...).
  #[error("network error: {0}")]
  Network(String),

  /// The server answered OK but the body was not what we expect.
  #[error("invalid response body: {0}")]
  Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    ApiError::Network(e.to_string())
  }
}

impl ApiError {
  /// True when the request may never have reached the server, i.e. the
  /// failure is attributable to connectivity rather than the server's
  /// verdict on the request.
  pub fn is_connectivity(&self) -> bool {
    matches!(self, ApiError::Network(_))
  }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Operations the reflections server exposes.
#[async_trait]
pub trait ReflectionsApi: Send + Sync {
  /// List all reflections.
  async fn list(&self) -> ApiResult<Vec<Reflection>>;

  /// Create a reflection from free-text content. Returns the record the
  /// server assigned (id and date included).
  async fn create(&self, content: &str) -> ApiResult<Reflection>;

  /// Delete a reflection by id. Any OK-class status counts as success.
  async fn delete(&self, id: u64) -> ApiResult<()>;
}
