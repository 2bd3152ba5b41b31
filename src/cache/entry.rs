//! Cached value plus the clock data needed to classify it.

use std::time::Duration;

use tokio::time::Instant;

/// Freshness of an [`Entry`] at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Past the stale threshold but not yet expired: still served.
    Stale,
    Expired,
}

/// Immutable cache entry. Replaced wholesale, never mutated in place.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    payload: V,
    ttl: Duration,
    stale_window: Duration,
    created_at: Instant,
}

impl<V> Entry<V> {
    pub fn new(payload: V, ttl: Duration, stale_window: Duration) -> Self {
        Self {
            payload,
            ttl,
            stale_window,
            created_at: Instant::now(),
        }
    }

    pub fn payload(&self) -> &V {
        &self.payload
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Instant {
        self.created_at + self.ttl
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at()
    }

    /// True once `now` is inside the trailing `stale_window` of the TTL.
    ///
    /// A window wider than the TTL puts the threshold before `created_at`, so
    /// the entry is due for revalidation immediately after creation.
    pub fn should_revalidate(&self, stale_window: Duration) -> bool {
        self.should_revalidate_at(Instant::now(), stale_window)
    }

    fn should_revalidate_at(&self, now: Instant, stale_window: Duration) -> bool {
        match self.expires_at().checked_sub(stale_window) {
            Some(threshold) => now > threshold,
            None => true,
        }
    }

    /// Classification using the stale window this entry was written with.
    pub fn freshness(&self) -> Freshness {
        self.freshness_with(self.stale_window)
    }

    pub fn freshness_with(&self, stale_window: Duration) -> Freshness {
        let now = Instant::now();
        if self.is_expired_at(now) {
            Freshness::Expired
        } else if self.should_revalidate_at(now, stale_window) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn entry_moves_from_fresh_to_stale_to_expired() {
        let entry = Entry::new("v", Duration::from_secs(10), Duration::from_secs(3));
        assert_eq!(entry.freshness(), Freshness::Fresh);

        advance(Duration::from_secs(8)).await;
        assert_eq!(entry.freshness(), Freshness::Stale);
        assert!(!entry.is_expired());

        advance(Duration::from_secs(3)).await;
        assert_eq!(entry.freshness(), Freshness::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_strictly_after_ttl() {
        let entry = Entry::new(1, Duration::from_secs(5), Duration::ZERO);

        advance(Duration::from_secs(5)).await;
        assert!(!entry.is_expired());

        advance(Duration::from_millis(1)).await;
        assert!(entry.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_stale_window_is_stale_from_creation() {
        let entry = Entry::new((), Duration::from_secs(5), Duration::from_secs(60));
        assert!(entry.should_revalidate(Duration::from_secs(60)));
        assert_eq!(entry.freshness(), Freshness::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn expires_at_is_creation_plus_ttl() {
        let entry = Entry::new((), Duration::from_secs(42), Duration::ZERO);
        assert_eq!(entry.expires_at() - entry.created_at(), Duration::from_secs(42));
    }
}
