//! Request and response rewriting around the HTTP cache
//!
//! The fetcher stacks these as `OfflineFallback -> HttpCache -> FreshnessFloor`,
//! so the floor sees origin responses before the cache stores them and the
//! offline rewrite happens before the cache is consulted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::Extensions;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, WARNING};
use reqwest::{Method, Request, Response, StatusCode};
use reqwest_middleware::{Error, Middleware, Next};
use tracing::{debug, warn};

use super::cache::{CachedResponse, DiskCache, unix_now};
use super::connectivity::Connectivity;

/// Parsed `Cache-Control` directives relevant to this cache
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheControl {
    pub no_store: bool,
    pub no_cache: bool,
    pub must_revalidate: bool,
    pub only_if_cached: bool,
    pub max_age: Option<u64>,
    /// `max-stale` without a value accepts any staleness
    pub max_stale: Option<u64>,
}

impl CacheControl {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut directives = Self::default();
        for directive in value.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            let (name, argument) = match directive.split_once('=') {
                Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
                None => (directive.as_str(), None),
            };
            match name {
                "no-store" => directives.no_store = true,
                "no-cache" => directives.no_cache = true,
                "must-revalidate" => directives.must_revalidate = true,
                "only-if-cached" => directives.only_if_cached = true,
                "max-age" => directives.max_age = argument.and_then(|a| a.parse().ok()),
                "max-stale" => {
                    directives.max_stale =
                        Some(argument.and_then(|a| a.parse().ok()).unwrap_or(u64::MAX));
                }
                _ => {}
            }
        }
        directives
    }

    /// Directives from a header map; `None` when the header is missing or
    /// not valid text
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(Self::parse)
    }

    /// True when a response with these directives may be stored
    #[must_use]
    pub fn is_storable(&self) -> bool {
        !self.no_store && self.max_age.is_some_and(|age| age > 0)
    }
}

/// Rewrites uncacheable origin responses to a minimum freshness window
pub struct FreshnessFloor {
    header: HeaderValue,
}

impl FreshnessFloor {
    pub fn new(max_age: Duration) -> Result<Self, Error> {
        let header = HeaderValue::try_from(format!("public, max-age={}", max_age.as_secs()))
            .map_err(Error::middleware)?;
        Ok(Self { header })
    }

    fn needs_floor(headers: &HeaderMap) -> bool {
        match CacheControl::from_headers(headers) {
            None => true,
            Some(cc) => cc.no_store || cc.no_cache || cc.must_revalidate || cc.max_age == Some(0),
        }
    }
}

#[async_trait]
impl Middleware for FreshnessFloor {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let mut response = next.run(req, extensions).await?;
        if Self::needs_floor(response.headers()) {
            debug!(
                original = ?response.headers().get(CACHE_CONTROL),
                "Applying freshness floor to response"
            );
            response
                .headers_mut()
                .insert(CACHE_CONTROL, self.header.clone());
        }
        Ok(response)
    }
}

/// Forces cache-only requests while the network is unavailable
pub struct OfflineFallback {
    connectivity: Arc<dyn Connectivity>,
    header: HeaderValue,
}

impl OfflineFallback {
    pub fn new(connectivity: Arc<dyn Connectivity>, max_stale: Duration) -> Result<Self, Error> {
        let header = HeaderValue::try_from(format!(
            "public, only-if-cached, max-stale={}",
            max_stale.as_secs()
        ))
        .map_err(Error::middleware)?;
        Ok(Self {
            connectivity,
            header,
        })
    }
}

#[async_trait]
impl Middleware for OfflineFallback {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        if !self.connectivity.is_network_available().await {
            debug!(url = %req.url(), "Network unavailable, requesting cached copy");
            req.headers_mut().insert(CACHE_CONTROL, self.header.clone());
        }
        next.run(req, extensions).await
    }
}

/// Serves GET requests from the disk cache and stores cacheable responses
pub struct HttpCache {
    cache: Arc<DiskCache>,
}

impl HttpCache {
    #[must_use]
    pub fn new(cache: Arc<DiskCache>) -> Self {
        Self { cache }
    }

    async fn lookup(&self, url: &str) -> Option<CachedResponse> {
        match self.cache.get(url).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!("HTTP cache read failed, treating as miss: {e:#}");
                None
            }
        }
    }

    async fn store(&self, url: &str, response: Response, now: u64) -> reqwest_middleware::Result<Response> {
        let max_age = match CacheControl::from_headers(response.headers()) {
            Some(cc) if response.status().is_success() && cc.is_storable() => cc.max_age.unwrap_or(0),
            _ => return Ok(response),
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        let entry = CachedResponse {
            status,
            headers,
            body,
            stored_at: now,
            max_age,
        };
        if let Err(e) = self.cache.put(url, &entry).await {
            warn!("HTTP cache write failed: {e:#}");
        }
        to_response(&entry, false)
    }
}

#[async_trait]
impl Middleware for HttpCache {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        if req.method() != Method::GET {
            return next.run(req, extensions).await;
        }

        let url = req.url().to_string();
        let request_cc = CacheControl::from_headers(req.headers()).unwrap_or_default();
        let now = unix_now().map_err(Error::Middleware)?;

        if let Some(entry) = self.lookup(&url).await {
            if !request_cc.no_cache && entry.is_fresh(now) {
                debug!(%url, age = entry.age(now), "Serving fresh cached response");
                return to_response(&entry, false);
            }
            if request_cc.only_if_cached {
                let tolerance = entry
                    .max_age
                    .saturating_add(request_cc.max_stale.unwrap_or(0));
                if entry.age(now) <= tolerance {
                    debug!(%url, age = entry.age(now), "Serving stale cached response");
                    return to_response(&entry, true);
                }
            }
        }

        if request_cc.only_if_cached {
            debug!(%url, "No usable cached response for cache-only request");
            return unsatisfiable();
        }

        let response = next.run(req, extensions).await?;
        self.store(&url, response, now).await
    }
}

fn to_response(entry: &CachedResponse, stale: bool) -> reqwest_middleware::Result<Response> {
    let mut builder = http::Response::builder().status(entry.status);
    for (name, value) in &entry.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if stale {
        builder = builder.header(WARNING, "110 - \"Response is Stale\"");
    }
    let response = builder.body(entry.body.clone()).map_err(Error::middleware)?;
    Ok(Response::from(response))
}

fn unsatisfiable() -> reqwest_middleware::Result<Response> {
    let response = http::Response::builder()
        .status(StatusCode::GATEWAY_TIMEOUT)
        .body(Vec::new())
        .map_err(Error::middleware)?;
    Ok(Response::from(response))
}
