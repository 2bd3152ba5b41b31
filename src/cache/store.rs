//! Cache storage.
//!
//! Maps cache keys to immutable [`Entry`] values. Every upstream fetch for a
//! key runs under that key's lock, so at most one fetch per key is in flight.
//! `set` and `invalidate` do not take the key lock: a fetch that is already
//! running may land after them and reinstate a value.

use std::{
    collections::HashMap,
    fmt::Display,
    future::Future,
    sync::{Arc, RwLock},
    time::Duration,
};

use metrics::{counter, histogram};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::{CacheConfig, CachePolicy};
use super::entry::{Entry, Freshness};
use super::lock::{InFlight, KeyedLocks, rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "isr_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "isr_cache_miss_total";
pub(crate) const METRIC_CACHE_STALE: &str = "isr_cache_stale_total";
pub(crate) const METRIC_CACHE_REVALIDATE: &str = "isr_cache_revalidate_total";
pub(crate) const METRIC_CACHE_INVALIDATE: &str = "isr_cache_invalidate_total";
pub(crate) const METRIC_CACHE_FETCH_MS: &str = "isr_cache_fetch_ms";

/// Result of [`CacheStore::get_or_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup<V> {
    pub value: V,
    /// False only when this call ran the fetch itself.
    pub from_cache: bool,
}

/// Point-in-time entry counts. The four classes are disjoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub expired: usize,
    pub stale: usize,
    pub fresh: usize,
}

/// In-memory ISR store. Cloning yields another handle to the same entries.
pub struct CacheStore<V> {
    inner: Arc<StoreInner<V>>,
}

struct StoreInner<V> {
    entries: RwLock<HashMap<String, Arc<Entry<V>>>>,
    locks: KeyedLocks,
    revalidating: InFlight,
    default_stale_window: Duration,
}

impl<V> Clone for CacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl<V> CacheStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: RwLock::new(HashMap::new()),
                locks: KeyedLocks::new(),
                revalidating: InFlight::new(),
                default_stale_window: Duration::from_secs(config.default_stale_seconds),
            }),
        }
    }

    /// Return the cached value for `key`, fetching it when absent or expired.
    ///
    /// A stale entry is returned as-is and one background revalidation is
    /// scheduled for the key. Errors from the synchronous fetch are returned
    /// unchanged and nothing is stored. Errors from a background fetch are
    /// logged and the stale entry stays in place.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        policy: &CachePolicy,
        fetch: F,
    ) -> Result<Lookup<V>, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let stale_window = policy.stale_window();

        if let Some(entry) = self.entry(key) {
            match entry.freshness_with(stale_window) {
                Freshness::Fresh => return Ok(self.hit(key, &entry)),
                Freshness::Stale => {
                    self.schedule_revalidation(key, entry.created_at(), policy, fetch);
                    return Ok(self.hit(key, &entry));
                }
                Freshness::Expired => {}
            }
        }

        let _guard = self.inner.locks.acquire(key).await;

        // Another caller may have filled the key while we waited.
        if let Some(entry) = self.entry(key) {
            match entry.freshness_with(stale_window) {
                Freshness::Fresh => return Ok(self.hit(key, &entry)),
                Freshness::Stale => {
                    self.schedule_revalidation(key, entry.created_at(), policy, fetch);
                    return Ok(self.hit(key, &entry));
                }
                Freshness::Expired => {}
            }
        }

        debug!(cache = "isr", outcome = "miss", key, "fetching synchronously");
        counter!(METRIC_CACHE_MISS).increment(1);

        let started_at = Instant::now();
        let value = fetch().await?;
        histogram!(METRIC_CACHE_FETCH_MS, "mode" => "sync")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        self.insert(key, Entry::new(value.clone(), policy.ttl(), stale_window));

        Ok(Lookup {
            value,
            from_cache: false,
        })
    }

    /// Install `value` under `key` unconditionally.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        let entry = Entry::new(value, ttl, self.inner.default_stale_window);
        self.insert(key, entry);
    }

    /// Install `value` under `key` with the lifetimes of `policy`.
    pub fn set_with_policy(&self, key: &str, value: V, policy: &CachePolicy) {
        self.insert(key, Entry::new(value, policy.ttl(), policy.stale_window()));
    }

    /// Cached value for `key` unless it has expired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.entry(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.payload().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove every entry, or every entry whose key contains `pattern`.
    ///
    /// Returns the number of removed entries.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut entries = rw_write(&self.inner.entries, SOURCE, "invalidate");
        let removed = match pattern {
            None => {
                let removed = entries.len();
                entries.clear();
                removed
            }
            Some(pattern) => {
                let before = entries.len();
                entries.retain(|key, _| !key.contains(pattern));
                before - entries.len()
            }
        };
        drop(entries);

        let scope = if pattern.is_some() { "pattern" } else { "all" };
        counter!(METRIC_CACHE_INVALIDATE, "scope" => scope).increment(1);
        debug!(cache = "isr", scope, pattern, removed, "cache invalidated");
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) -> usize {
        self.invalidate(None)
    }

    pub fn stats(&self) -> StoreStats {
        let entries = rw_read(&self.inner.entries, SOURCE, "stats");
        let mut stats = StoreStats {
            total: entries.len(),
            ..StoreStats::default()
        };
        for entry in entries.values() {
            match entry.freshness() {
                Freshness::Expired => stats.expired += 1,
                Freshness::Stale => stats.stale += 1,
                Freshness::Fresh => stats.fresh += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a background revalidation for `key` is scheduled or running.
    pub fn is_revalidating(&self, key: &str) -> bool {
        self.inner.revalidating.contains(key)
    }

    fn entry(&self, key: &str) -> Option<Arc<Entry<V>>> {
        rw_read(&self.inner.entries, SOURCE, "entry").get(key).cloned()
    }

    fn insert(&self, key: &str, entry: Entry<V>) {
        rw_write(&self.inner.entries, SOURCE, "insert").insert(key.to_owned(), Arc::new(entry));
    }

    fn hit(&self, key: &str, entry: &Entry<V>) -> Lookup<V> {
        debug!(cache = "isr", outcome = "hit", key, "serving cached entry");
        counter!(METRIC_CACHE_HIT).increment(1);
        Lookup {
            value: entry.payload().clone(),
            from_cache: true,
        }
    }

    fn schedule_revalidation<F, Fut, E>(
        &self,
        key: &str,
        observed: Instant,
        policy: &CachePolicy,
        fetch: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let Some(claim) = self.inner.revalidating.claim(key) else {
            debug!(cache = "isr", key, "revalidation already in flight");
            return;
        };
        counter!(METRIC_CACHE_STALE).increment(1);

        let store = self.clone();
        let key = key.to_owned();
        let ttl = policy.ttl();
        let stale_window = policy.stale_window();

        tokio::spawn(async move {
            let _claim = claim;
            let _guard = store.inner.locks.acquire(&key).await;

            if let Some(current) = store.entry(&key)
                && current.created_at() > observed
            {
                debug!(cache = "isr", key = %key, "entry replaced before revalidation ran");
                counter!(METRIC_CACHE_REVALIDATE, "outcome" => "skipped").increment(1);
                return;
            }

            let started_at = Instant::now();
            match fetch().await {
                Ok(value) => {
                    store.insert(&key, Entry::new(value, ttl, stale_window));
                    histogram!(METRIC_CACHE_FETCH_MS, "mode" => "background")
                        .record(started_at.elapsed().as_secs_f64() * 1000.0);
                    counter!(METRIC_CACHE_REVALIDATE, "outcome" => "refreshed").increment(1);
                    debug!(cache = "isr", key = %key, "entry revalidated");
                }
                Err(error) => {
                    counter!(METRIC_CACHE_REVALIDATE, "outcome" => "failed").increment(1);
                    warn!(
                        cache = "isr",
                        key = %key,
                        error = %error,
                        "background revalidation failed; keeping stale entry"
                    );
                }
            }
        });
    }
}
