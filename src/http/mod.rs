//! HTTP fetching through a disk-backed response cache
//!
//! [`CachingFetcher`] owns its client: there is no process-wide HTTP state.
//! Responses pass a freshness floor before they are cached, and requests made
//! while offline are rewritten to accept a stale cached copy.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use thiserror::Error;
use tracing::debug;

pub mod cache;
pub mod connectivity;
pub mod middleware;

pub use cache::{CachedResponse, DiskCache};
pub use connectivity::{Connectivity, FixedConnectivity, TcpProbe};
pub use middleware::{CacheControl, FreshnessFloor, HttpCache, OfflineFallback};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("Unexpected response status: {0}")]
    Status(StatusCode),

    #[error("Response body is empty")]
    EmptyBody,
}

/// Client and cache policy settings
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    /// Applied separately to connecting and to each read
    pub timeout: Duration,
    pub user_agent: String,
    /// Minimum freshness imposed on uncacheable responses
    pub freshness_floor: Duration,
    /// Staleness accepted while the network is unavailable
    pub max_stale: Duration,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("weather-resolver/{}", env!("CARGO_PKG_VERSION")),
            freshness_floor: Duration::from_secs(10),
            max_stale: Duration::from_secs(3 * 60 * 60),
        }
    }
}

pub struct CachingFetcher {
    client: ClientWithMiddleware,
}

impl CachingFetcher {
    pub fn new(
        settings: &FetcherSettings,
        cache: Arc<DiskCache>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.timeout)
            .read_timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(settings.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;

        let offline = OfflineFallback::new(connectivity, settings.max_stale)
            .context("Invalid offline cache policy")?;
        let floor =
            FreshnessFloor::new(settings.freshness_floor).context("Invalid freshness floor")?;

        let client = ClientBuilder::new(client)
            .with(offline)
            .with(HttpCache::new(cache))
            .with(floor)
            .build();

        Ok(Self { client })
    }

    /// GET `url` and return the body text.
    ///
    /// Redirects are not followed and nothing is retried: a 3xx is reported
    /// like any other non-2xx status.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!(%url, "Fetching");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.into()))?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        debug!(%url, bytes = body.len(), "Fetched");
        Ok(body)
    }
}
