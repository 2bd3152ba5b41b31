//! ISR cache.
//!
//! A read-through cache with stale-while-revalidate semantics:
//!
//! - **Fresh** entries are served as-is.
//! - **Stale** entries (inside the trailing stale window of their TTL) are
//!   served immediately while one background fetch per key refreshes them.
//! - **Expired** or absent entries are fetched synchronously under a per-key
//!   lock, so concurrent callers share a single upstream request.
//!
//! A [`RootHashMonitor`] clears the whole store whenever the upstream content
//! fingerprint changes.
//!
//! ## Configuration
//!
//! Controlled via `isr-cache.toml`:
//!
//! ```toml
//! [cache]
//! key_prefix = "isr"
//! default_ttl_seconds = 3600
//! default_stale_seconds = 60
//! root_check_interval_seconds = 10
//! # ... see config.rs for all options
//! ```

mod config;
mod entry;
mod isr;
mod keys;
mod lock;
mod middleware;
mod root_hash;
mod route;
mod store;

pub use config::{CacheConfig, CachePolicy};
pub use entry::{Entry, Freshness};
pub use isr::{CacheStats, CacheStatus, ContentKind, IsrCache, IsrHandler, IsrResponse, Rendered};
pub use keys::{KeyBuilder, RequestIdentity, RouteParams, resolve_path};
pub use middleware::{PARTIAL_REQUEST_HEADER, X_CACHE, is_partial_request};
pub use root_hash::{RootHashMonitor, RootHashSource};
pub use route::{PageLoader, RouteKind, RouteSpec, SlugEnumerator, page_loader, slug_enumerator};
pub use store::{CacheStore, Lookup, StoreStats};

pub(crate) use root_hash::METRIC_ROOT_INVALIDATION;
pub(crate) use store::{
    METRIC_CACHE_FETCH_MS, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATE, METRIC_CACHE_MISS,
    METRIC_CACHE_REVALIDATE, METRIC_CACHE_STALE,
};
