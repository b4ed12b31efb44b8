//! Cache-aside layer
//!
//! The record store is authoritative; the cache only holds disposable
//! JSON projections with a TTL. Reads consult the cache and fall back to
//! the store, writes invalidate (never update) the entry after commit.
//!
//! A reader racing a write can repopulate the cache with the pre-write
//! value between commit and invalidation. That entry lives at most one TTL:
//! staleness is bounded, consistency is not strict.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Cache failure. Never propagates past [`CacheAside`].
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to serialize value for {key}: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("failed to deserialize value for {key}: {source}")]
    Deserialize {
        key: String,
        source: serde_json::Error,
    },

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key/value store with per-entry expiry
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value`, replacing any existing entry for `key`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process TTL cache.
///
/// Expired entries are dropped lazily on read and by [`purge_expired`](Self::purge_expired).
/// Long-lived caches should run [`spawn_purger`](Self::spawn_purger), otherwise keys
/// that are never read again stay in the map.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Backend("cache lock poisoned".into()))
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }

    /// Purge expired entries every `every` until the cache is dropped.
    ///
    /// The task holds a weak reference and exits on the first tick after the
    /// last strong reference is gone.
    pub fn spawn_purger(cache: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(cache);
        let every = every.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                match cache.purge_expired() {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "purged expired cache entries"),
                    Err(err) => tracing::warn!(error = %err, "cache purge failed"),
                }
            }
            tracing::debug!("cache purger stopped");
        })
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.lock()?.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Typed cache-aside access for one kind of value.
///
/// Keys are `{prefix}_{id}`. Failures are logged at `warn` and swallowed;
/// callers only ever see a hit or a miss.
pub struct CacheAside<T> {
    store: Arc<dyn CacheStore>,
    prefix: &'static str,
    ttl: Duration,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheAside<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: self.prefix,
            ttl: self.ttl,
            _value: PhantomData,
        }
    }
}

impl<T> CacheAside<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn CacheStore>, prefix: &'static str, ttl: Duration) -> Self {
        Self {
            store,
            prefix,
            ttl,
            _value: PhantomData,
        }
    }

    pub fn key(&self, id: i64) -> String {
        format!("{}_{}", self.prefix, id)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, or `None` on a miss.
    ///
    /// An entry that no longer decodes is treated as a miss and dropped.
    pub async fn read(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::trace!(key, "cache miss");
                return None;
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "cache read failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::trace!(key, "cache hit");
                Some(value)
            }
            Err(source) => {
                let err = CacheError::Deserialize {
                    key: key.to_owned(),
                    source,
                };
                tracing::warn!(key, error = %err, "dropping undecodable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    /// Store `value` under `key` for one TTL, replacing any existing entry.
    pub async fn populate(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(source) => {
                let err = CacheError::Serialize {
                    key: key.to_owned(),
                    source,
                };
                tracing::warn!(key, error = %err, "cache populate failed");
                return;
            }
        };

        if let Err(err) = self.store.set(key, raw, self.ttl).await {
            tracing::warn!(key, error = %err, "cache populate failed");
        }
    }

    /// Remove `key` whether or not it is present.
    pub async fn invalidate(&self, key: &str) {
        if let Err(err) = self.store.delete(key).await {
            tracing::warn!(key, error = %err, "cache invalidate failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: i64,
        name: String,
    }

    fn layer(cache: Arc<MemoryCache>) -> CacheAside<Item> {
        CacheAside::new(cache, "item", Duration::from_secs(600))
    }

    /// Backend that fails every call.
    struct Broken;

    #[async_trait]
    impl CacheStore for Broken {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    #[test]
    fn key_format() {
        let cache = layer(Arc::new(MemoryCache::new()));
        assert_eq!(cache.key(12), "item_12");
    }

    #[tokio::test]
    async fn populate_then_read_hits() {
        let cache = layer(Arc::new(MemoryCache::new()));
        let item = Item {
            id: 1,
            name: "alice".into(),
        };
        let key = cache.key(1);

        assert_eq!(cache.read(&key).await, None);
        cache.populate(&key, &item).await;
        assert_eq!(cache.read(&key).await, Some(item));
    }

    #[tokio::test]
    async fn invalidate_missing_key_is_fine() {
        let backend = Arc::new(MemoryCache::new());
        let cache = layer(Arc::clone(&backend));
        cache.invalidate("item_404").await;
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let backend = Arc::new(MemoryCache::new());
        let cache: CacheAside<Item> =
            CacheAside::new(backend.clone(), "item", Duration::from_secs(10));
        let item = Item {
            id: 2,
            name: "bob".into(),
        };
        cache.populate("item_2", &item).await;

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.read("item_2").await, Some(item));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.read("item_2").await, None);
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = MemoryCache::new();
        cache
            .set("short", "1".into(), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set("long", "2".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.get("long").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn purger_evicts_keys_that_are_never_read_again() {
        let cache = Arc::new(MemoryCache::new());
        let purger = MemoryCache::spawn_purger(&cache, Duration::from_secs(60));

        for i in 0..1000 {
            cache
                .set(&format!("task_{i}"), "{}".into(), Duration::from_secs(1))
                .await
                .unwrap();
        }
        cache
            .set("user_1", "{}".into(), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1001);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.len(), 1);

        drop(cache);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(purger.is_finished());
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss_and_dropped() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .set("item_3", "not json".into(), Duration::from_secs(60))
            .await
            .unwrap();

        let cache = layer(Arc::clone(&backend));
        assert_eq!(cache.read("item_3").await, None);
        assert!(backend.get("item_3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn backend_failures_are_swallowed() {
        let cache: CacheAside<Item> =
            CacheAside::new(Arc::new(Broken), "item", Duration::from_secs(60));
        let item = Item {
            id: 4,
            name: "carol".into(),
        };

        cache.populate("item_4", &item).await;
        cache.invalidate("item_4").await;
        assert_eq!(cache.read("item_4").await, None);
    }
}
