/// Image retrieval
///
/// This module provides an async trait for fetching remote image bytes,
/// with an implementation that goes through the image relay and an
/// in-memory one for tests.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("image request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("image transport error: {0}")]
    Transport(String),

    #[error("image not found: {0}")]
    NotFound(String),
}

/// Whether `value` is an absolute `http`/`https` locator worth fetching
pub fn is_remote_url(value: &str) -> bool {
    match Url::parse(value.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host(),
        Err(_) => false,
    }
}

/// Relay URL for `target`: `endpoint` with `target` as the `url` query parameter
///
/// # Example
/// ```
/// use gridfill::fetch::proxy_url;
///
/// let url = proxy_url("http://localhost:3000/image", "https://cdn.example.com/a b.png").unwrap();
/// assert_eq!(
///     url.as_str(),
///     "http://localhost:3000/image?url=https%3A%2F%2Fcdn.example.com%2Fa+b.png"
/// );
/// ```
pub fn proxy_url(endpoint: &str, target: &str) -> Result<Url, FetchError> {
    let mut url = Url::parse(endpoint).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
    url.query_pairs_mut().append_pair("url", target);
    Ok(url)
}

/// Async trait for retrieving image bytes by URL
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches images through the relay server
///
/// Only available with the `http` feature.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct ProxyFetcher {
    client: reqwest::Client,
    endpoint: String,
}

#[cfg(feature = "http")]
impl ProxyFetcher {
    /// Create a fetcher for the relay at `endpoint`
    ///
    /// # Example
    /// ```no_run
    /// use gridfill::fetch::ProxyFetcher;
    /// use std::time::Duration;
    ///
    /// let fetcher = ProxyFetcher::new("http://localhost:3000/image", Duration::from_secs(30)).unwrap();
    /// ```
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> Result<Self, FetchError> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(ProxyFetcher { client, endpoint })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl ImageFetcher for ProxyFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_url = proxy_url(&self.endpoint, url)?;
        let response = self
            .client
            .get(request_url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        tracing::debug!(url, bytes = bytes.len(), "image fetched");
        Ok(bytes.to_vec())
    }
}

/// In-memory image store
///
/// Serves canned bytes by exact URL and records every request, useful for
/// testing.
#[derive(Clone, Default)]
pub struct InMemoryFetcher {
    images: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    requests: Arc<RwLock<Vec<String>>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `url`
    pub fn add(&self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let mut images = self.images.write().unwrap_or_else(PoisonError::into_inner);
        images.insert(url.into(), bytes.into());
    }

    /// URLs requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ImageFetcher for InMemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        let images = self.images.read().unwrap_or_else(PoisonError::into_inner);
        images
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}
