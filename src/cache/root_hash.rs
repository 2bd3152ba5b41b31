//! Coarse invalidation driven by the upstream content root hash.
//!
//! The upstream publishes one fingerprint for its whole content set. When it
//! changes, every cached entry is dropped.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, info};

use super::lock::mutex_lock;
use super::store::CacheStore;

const SOURCE: &str = "cache::root_hash";

pub(crate) const METRIC_ROOT_INVALIDATION: &str = "isr_cache_root_invalidation_total";

/// Supplies the current upstream root hash.
#[async_trait]
pub trait RootHashSource: Send + Sync {
    /// `None` when the hash is unknown: unreachable upstream, non-200
    /// status or a body without a hash.
    async fn root_hash(&self, base_url: &str) -> Option<String>;
}

#[derive(Debug, Default)]
struct RootHashState {
    hash: Option<String>,
    last_check: Option<Instant>,
}

/// Rate-limited poller of the upstream root hash.
pub struct RootHashMonitor {
    source: Arc<dyn RootHashSource>,
    interval: Duration,
    state: Mutex<RootHashState>,
}

impl RootHashMonitor {
    pub fn new(source: Arc<dyn RootHashSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            state: Mutex::new(RootHashState::default()),
        }
    }

    /// Clear `store` if the upstream root hash changed since the last check.
    ///
    /// Returns `false` without contacting upstream when called again within
    /// the check interval. The first observed hash is adopted without
    /// clearing. An unknown hash counts as "no change".
    pub async fn check_invalidation<V>(&self, base_url: &str, store: &CacheStore<V>) -> bool
    where
        V: Clone + Send + Sync + 'static,
    {
        {
            let mut state = mutex_lock(&self.state, SOURCE, "check_invalidation.rate_limit");
            let now = Instant::now();
            if let Some(last_check) = state.last_check
                && now.duration_since(last_check) < self.interval
            {
                return false;
            }
            state.last_check = Some(now);
        }

        let Some(current) = self.source.root_hash(base_url).await else {
            debug!(base_url, "root hash unavailable; keeping cache");
            return false;
        };

        let mut state = mutex_lock(&self.state, SOURCE, "check_invalidation.compare");
        let changed = state
            .hash
            .as_deref()
            .is_some_and(|previous| previous != current);

        if changed {
            let removed = store.clear();
            counter!(METRIC_ROOT_INVALIDATION).increment(1);
            info!(
                previous = state.hash.as_deref().unwrap_or(""),
                current = %current,
                removed,
                "upstream root hash changed; cache cleared"
            );
        }

        state.hash = Some(current);
        changed
    }

    /// Last observed root hash.
    pub fn root_hash(&self) -> Option<String> {
        mutex_lock(&self.state, SOURCE, "root_hash").hash.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::advance;

    use super::*;

    #[derive(Default)]
    struct FakeSource {
        hash: Mutex<Option<String>>,
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn serve(&self, hash: Option<&str>) {
            *self.hash.lock().expect("fake hash lock") = hash.map(str::to_string);
        }
    }

    #[async_trait]
    impl RootHashSource for FakeSource {
        async fn root_hash(&self, _base_url: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hash.lock().expect("fake hash lock").clone()
        }
    }

    fn monitor(source: &Arc<FakeSource>) -> RootHashMonitor {
        RootHashMonitor::new(source.clone(), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn first_hash_is_adopted_without_clearing() {
        let source = Arc::new(FakeSource::default());
        source.serve(Some("h1"));
        let monitor = monitor(&source);
        let store = CacheStore::default();
        store.set("isr:/blog", 1, Duration::from_secs(60));

        assert!(!monitor.check_invalidation("http://up", &store).await);
        assert_eq!(monitor.root_hash().as_deref(), Some("h1"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn changed_hash_clears_store() {
        let source = Arc::new(FakeSource::default());
        source.serve(Some("h1"));
        let monitor = monitor(&source);
        let store = CacheStore::default();

        monitor.check_invalidation("http://up", &store).await;
        store.set("isr:/blog", 1, Duration::from_secs(60));

        source.serve(Some("h2"));
        advance(Duration::from_secs(11)).await;

        assert!(monitor.check_invalidation("http://up", &store).await);
        assert!(store.is_empty());
        assert_eq!(monitor.root_hash().as_deref(), Some("h2"));
    }

    #[tokio::test(start_paused = true)]
    async fn checks_within_interval_hit_upstream_once() {
        let source = Arc::new(FakeSource::default());
        source.serve(Some("h1"));
        let monitor = monitor(&source);
        let store: CacheStore<u8> = CacheStore::default();

        monitor.check_invalidation("http://up", &store).await;
        advance(Duration::from_secs(5)).await;
        monitor.check_invalidation("http://up", &store).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_hash_fails_open() {
        let source = Arc::new(FakeSource::default());
        source.serve(Some("h1"));
        let monitor = monitor(&source);
        let store = CacheStore::default();
        monitor.check_invalidation("http://up", &store).await;
        store.set("isr:/blog", 1, Duration::from_secs(60));

        source.serve(None);
        advance(Duration::from_secs(11)).await;

        assert!(!monitor.check_invalidation("http://up", &store).await);
        assert_eq!(store.len(), 1);
        assert_eq!(monitor.root_hash().as_deref(), Some("h1"));
    }
}
