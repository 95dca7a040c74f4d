use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use super::types::{ApiErrorBody, NewReflection, Reflection, ReflectionsDoc};
use super::{ApiError, ApiResult, ReflectionsApi};

/// HTTP client for the reflections API.
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
  base: Url,
  api_prefix: String,
}

impl HttpClient {
  pub fn new(base: Url, api_prefix: &str) -> Self {
    Self {
      client: reqwest::Client::new(),
      base,
      api_prefix: api_prefix.trim_end_matches('/').to_string(),
    }
  }

  /// URL of the listing/creation endpoint.
  pub fn collection_url(&self) -> Url {
    self.join(&self.api_prefix)
  }

  fn item_url(&self, id: u64) -> Url {
    self.join(&format!("{}/{}", self.api_prefix, id))
  }

  fn join(&self, path: &str) -> Url {
    // Url::join treats the base path as a directory only with a trailing
    // slash, so splice the path directly instead.
    let mut url = self.base.clone();
    url.set_path(path);
    url
  }

  /// Convert a non-success response into `ApiError::Rejected`, pulling the
  /// message out of an `{"error": ...}` body when the server sent one.
  async fn rejection(status: StatusCode, resp: reqwest::Response) -> ApiError {
    let message = match resp.bytes().await {
      Ok(body) => serde_json::from_slice::<ApiErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or_else(|_| format!("HTTP {}", status.as_u16())),
      Err(_) => format!("HTTP {}", status.as_u16()),
    };
    ApiError::Rejected {
      status: status.as_u16(),
      message,
    }
  }
}

#[async_trait]
impl ReflectionsApi for HttpClient {
  async fn list(&self) -> ApiResult<Vec<Reflection>> {
    let url = self.collection_url();
    let resp = self.client.get(url).send().await?;

    let status = resp.status();
    if !status.is_success() {
      return Err(Self::rejection(status, resp).await);
    }

    let body = resp.bytes().await?;
    let doc: ReflectionsDoc = serde_json::from_slice(&body)?;
    Ok(doc.reflections)
  }

  async fn create(&self, content: &str) -> ApiResult<Reflection> {
    let url = self.collection_url();
    let body = NewReflection {
      content: content.to_string(),
    };

    let resp = self.client.post(url).json(&body).send().await?;

    let status = resp.status();
    if !status.is_success() {
      return Err(Self::rejection(status, resp).await);
    }

    let body = resp.bytes().await?;
    let created: Reflection = serde_json::from_slice(&body)?;
    Ok(created)
  }

  async fn delete(&self, id: u64) -> ApiResult<()> {
    let url = self.item_url(id);
    let resp = self.client.delete(url).send().await?;

    let status = resp.status();
    if !status.is_success() {
      return Err(Self::rejection(status, resp).await);
    }

    Ok(())
  }
}
