//! Metadata retrieval.
//!
//! One GET per call, always bypassing caches, never retried. Anything other
//! than a 2xx response carrying valid JSON is a [`FetchError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed metadata: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that can produce the product metadata document.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self) -> Result<Value, FetchError>;
}

pub struct HttpMetadataSource {
    client: reqwest::Client,
    url: String,
}

impl HttpMetadataSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("radar-viewer/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch(&self) -> Result<Value, FetchError> {
        debug!("fetching metadata from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header(header::ACCEPT, "application/json")
            .header(header::CACHE_CONTROL, "no-cache, no-store")
            .header(header::PRAGMA, "no-cache")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
