use std::sync::{
    Arc, LockResult, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use dashmap::DashMap;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

/// Take the guard out of a poisoned std lock. Guarded state is only ever
/// replaced wholesale, never mutated in place.
fn recover<G>(
    result: LockResult<G>,
    owner: &'static str,
    op: &'static str,
    kind: &'static str,
) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            cache = "isr",
            owner,
            op,
            lock = kind,
            "lock poisoned by a panicking task; continuing with its contents"
        );
        poisoned.into_inner()
    })
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    recover(lock.read(), owner, op, "read")
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    owner: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    recover(lock.write(), owner, op, "write")
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    owner: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), owner, op, "mutex")
}

/// Lazily created async mutex per cache key.
///
/// Locks are never removed, so the table grows with the number of distinct
/// keys ever requested. A sweep of locks whose key has left the store would
/// bound it.
#[derive(Clone, Default)]
pub(crate) struct KeyedLocks {
    locks: Arc<DashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub(crate) async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out before awaiting so no shard guard is held across it.
        let lock = self
            .locks
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Keys whose background revalidation is currently scheduled or running.
#[derive(Clone, Default)]
pub(crate) struct InFlight {
    keys: Arc<DashMap<String, ()>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claim `key`; `None` when a revalidation for it is already in flight.
    pub(crate) fn claim(&self, key: &str) -> Option<InFlightGuard> {
        use dashmap::mapref::entry::Entry;

        match self.keys.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(InFlightGuard {
                    key: key.to_owned(),
                    keys: Arc::clone(&self.keys),
                })
            }
            Entry::Occupied(_) => None,
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }
}

pub(crate) struct InFlightGuard {
    key: String,
    keys: Arc<DashMap<String, ()>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}
