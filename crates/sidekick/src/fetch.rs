//
// fetch.rs
//
// Read-only retrieval of declaration files from a CDN
//

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::FetchError;

/// Source of declaration files addressed by a path relative to a base url
#[async_trait]
pub trait DeclarationFetcher: Send + Sync {
    async fn fetch(&self, url_path: &str) -> Result<String, FetchError>;
}

/// Fetcher issuing GET requests against a fixed base url
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base: Url,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher for `base_url`. The base must be an absolute url.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base = Url::parse(base_url).map_err(|e| FetchError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            client: Client::new(),
            base,
            timeout,
        })
    }

    /// Resolve a relative path against the base url
    pub fn resolve(&self, url_path: &str) -> Result<Url, FetchError> {
        self.base
            .join(url_path.trim_start_matches('/'))
            .map_err(|e| FetchError::InvalidUrl(format!("{url_path}: {e}")))
    }
}

#[async_trait]
impl DeclarationFetcher for HttpFetcher {
    async fn fetch(&self, url_path: &str) -> Result<String, FetchError> {
        let url = self.resolve(url_path)?;
        log::trace!("Fetching declaration file {}", url);

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(url.to_string())
                } else {
                    FetchError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(url.to_string(), status.as_u16()));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Transport(e.to_string())
            }
        })
    }
}

/// Fetcher that never reaches the network; every request fails.
///
/// Useful for offline operation: the environment falls back to whatever is
/// in the declaration cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl DeclarationFetcher for OfflineFetcher {
    async fn fetch(&self, url_path: &str) -> Result<String, FetchError> {
        Err(FetchError::Transport(format!("offline: {url_path}")))
    }
}
