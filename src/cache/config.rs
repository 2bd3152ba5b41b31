//! Cache configuration.
//!
//! Controls entry lifetimes, key shape and root-hash polling via `isr-cache.toml`.

use std::time::Duration;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_KEY_PREFIX: &str = "isr";
const DEFAULT_TTL_SECONDS: u64 = 3600;
const DEFAULT_STALE_SECONDS: u64 = 60;
const DEFAULT_ROOT_CHECK_INTERVAL_SECONDS: u64 = 10;
const DEFAULT_MAX_KEY_LEN: usize = 100;

/// Cache configuration from `isr-cache.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix for keys built by the request layer.
    pub key_prefix: String,
    /// TTL applied when a route does not set its own.
    pub default_ttl_seconds: u64,
    /// Stale-while-revalidate window applied when a route does not set its own.
    pub default_stale_seconds: u64,
    /// Minimum spacing between two upstream root-hash checks.
    pub root_check_interval_seconds: u64,
    /// Composed keys longer than this are replaced by a digest.
    pub max_key_len: usize,
    /// Seed the cache from the route registry before serving.
    pub prewarm_on_startup: bool,
    /// Development mode skips prewarming.
    pub dev_mode: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            default_stale_seconds: DEFAULT_STALE_SECONDS,
            root_check_interval_seconds: DEFAULT_ROOT_CHECK_INTERVAL_SECONDS,
            max_key_len: DEFAULT_MAX_KEY_LEN,
            prewarm_on_startup: true,
            dev_mode: false,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            key_prefix: settings.key_prefix.clone(),
            default_ttl_seconds: settings.default_ttl_seconds,
            default_stale_seconds: settings.default_stale_seconds,
            root_check_interval_seconds: settings.root_check_interval_seconds,
            max_key_len: settings.max_key_len,
            prewarm_on_startup: settings.prewarm_on_startup,
            dev_mode: settings.dev_mode,
        }
    }
}

impl CacheConfig {
    /// Policy built from the configured defaults.
    pub fn default_policy(&self) -> CachePolicy {
        CachePolicy::new(self.default_ttl_seconds, self.default_stale_seconds)
            .with_prefix(self.key_prefix.clone())
    }

    pub fn root_check_interval(&self) -> Duration {
        Duration::from_secs(self.root_check_interval_seconds)
    }

    /// Returns true when startup prewarming should run.
    pub fn should_prewarm(&self) -> bool {
        self.prewarm_on_startup && !self.dev_mode
    }
}

/// Lifetime and key prefix of one cacheable route.
///
/// `stale_seconds` larger than `ttl_seconds` is accepted: such entries are due
/// for revalidation from the moment they are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl_seconds: u64,
    pub stale_seconds: u64,
    pub key_prefix: String,
}

impl CachePolicy {
    pub fn new(ttl_seconds: u64, stale_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            stale_seconds,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_seconds)
    }

    /// `Cache-Control` value advertised alongside responses built under this policy.
    pub fn cache_control(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.ttl_seconds, self.stale_seconds
        )
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECONDS, DEFAULT_STALE_SECONDS)
    }
}
