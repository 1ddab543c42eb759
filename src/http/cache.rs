//! Persistent, size-bounded store for HTTP responses keyed by request URL

use anyhow::{Context, Result, anyhow};
use fjall::Keyspace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info};

const INDEX_KEY: &[u8] = b"\0lru-index";
const ENTRY_PREFIX: &str = "response:";

/// A response as kept on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Unix timestamp (seconds) when the response was stored
    pub stored_at: u64,
    /// Freshness lifetime in seconds
    pub max_age: u64,
}

impl CachedResponse {
    #[must_use]
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.stored_at)
    }

    #[must_use]
    pub fn is_fresh(&self, now: u64) -> bool {
        self.age(now) < self.max_age
    }

    fn size(&self) -> u64 {
        let headers: usize = self.headers.iter().map(|(k, v)| k.len() + v.len()).sum();
        (self.body.len() + headers) as u64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct IndexEntry {
    size: u64,
    last_used: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LruIndex {
    entries: BTreeMap<String, IndexEntry>,
    clock: u64,
}

impl LruIndex {
    fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    fn touch(&mut self, url: &str) {
        self.clock += 1;
        let clock = self.clock;
        if let Some(entry) = self.entries.get_mut(url) {
            entry.last_used = clock;
        }
    }

    fn insert(&mut self, url: &str, size: u64) {
        self.clock += 1;
        self.entries.insert(
            url.to_string(),
            IndexEntry {
                size,
                last_used: self.clock,
            },
        );
    }

    fn least_recently_used(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(url, _)| url.clone())
    }
}

/// Current time as Unix seconds
pub fn unix_now() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

fn entry_key(url: &str) -> Vec<u8> {
    format!("{ENTRY_PREFIX}{url}").into_bytes()
}

fn get_from_store(store: Keyspace, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
    Ok(store.get(key)?.map(|v| v.to_vec()))
}

/// Disk-backed HTTP response cache.
///
/// Total stored bytes never exceed `capacity`; the least recently used
/// responses are evicted first. The recency index is persisted next to the
/// entries, so eviction order survives restarts.
pub struct DiskCache {
    store: Keyspace,
    index: Mutex<LruIndex>,
    capacity: u64,
}

impl DiskCache {
    pub fn open(path: impl AsRef<Path>, capacity: u64) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create cache directory: {}", path.display()))?;
        let db = fjall::Database::builder(path)
            .open()
            .with_context(|| format!("Failed to open cache database: {}", path.display()))?;
        let store = db.keyspace("http", fjall::KeyspaceCreateOptions::default)?;

        let index = match get_from_store(store.clone(), INDEX_KEY.to_vec())? {
            Some(bytes) => postcard::from_bytes(&bytes).context("Corrupt cache index")?,
            None => LruIndex::default(),
        };
        info!(
            "Opened HTTP cache at {} ({} entries, {} of {} bytes)",
            path.display(),
            index.entries.len(),
            index.total_size(),
            capacity
        );

        Ok(Self {
            store,
            index: Mutex::new(index),
            capacity,
        })
    }

    /// Retrieves a stored response regardless of its freshness
    #[tracing::instrument(name = "query_http_cache", level = "debug", skip(self))]
    pub async fn get(&self, url: &str) -> Result<Option<CachedResponse>> {
        let mut index = self.index.lock().await;
        let store = self.store.clone();
        let key = entry_key(url);

        let Some(bytes) = task::spawn_blocking(move || get_from_store(store, key)).await?? else {
            debug!("Key not found");
            return Ok(None);
        };

        let entry: CachedResponse = match postcard::from_bytes(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Dropping unreadable cache entry: {e}");
                index.entries.remove(url);
                self.remove_key(entry_key(url)).await?;
                self.persist_index(&index).await?;
                return Ok(None);
            }
        };

        index.touch(url);
        self.persist_index(&index).await?;
        Ok(Some(entry))
    }

    /// Stores a response, evicting least recently used entries to stay
    /// within capacity. Responses larger than the whole cache are skipped.
    #[tracing::instrument(name = "put_http_cache", level = "debug", skip(self, response))]
    pub async fn put(&self, url: &str, response: &CachedResponse) -> Result<()> {
        let size = response.size();
        if size > self.capacity {
            debug!(size, "Response larger than cache capacity, not stored");
            return Ok(());
        }

        let mut index = self.index.lock().await;
        let bytes = postcard::to_stdvec(response)?;
        let store = self.store.clone();
        let key = entry_key(url);
        task::spawn_blocking(move || store.insert(key, bytes)).await??;
        index.insert(url, size);

        while index.total_size() > self.capacity {
            let victim = index
                .least_recently_used()
                .ok_or_else(|| anyhow!("Cache index empty while over capacity"))?;
            debug!(url = %victim, "Evicting least recently used response");
            index.entries.remove(&victim);
            self.remove_key(entry_key(&victim)).await?;
        }

        self.persist_index(&index).await
    }

    /// Manually removes a response from the cache
    pub async fn remove(&self, url: &str) -> Result<()> {
        let mut index = self.index.lock().await;
        index.entries.remove(url);
        self.remove_key(entry_key(url)).await?;
        self.persist_index(&index).await
    }

    pub async fn total_size(&self) -> u64 {
        self.index.lock().await.total_size()
    }

    pub async fn len(&self) -> usize {
        self.index.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn remove_key(&self, key: Vec<u8>) -> Result<()> {
        let store = self.store.clone();
        task::spawn_blocking(move || store.remove(key)).await??;
        Ok(())
    }

    async fn persist_index(&self, index: &LruIndex) -> Result<()> {
        let bytes = postcard::to_stdvec(index)?;
        let store = self.store.clone();
        task::spawn_blocking(move || store.insert(INDEX_KEY.to_vec(), bytes)).await??;
        Ok(())
    }
}
