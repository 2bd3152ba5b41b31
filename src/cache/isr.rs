//! Request-level ISR orchestration.
//!
//! [`IsrCache`] is the process-wide context: the store, the optional root-hash
//! monitor and the key builder. [`IsrHandler`] binds it to one
//! [`CachePolicy`] and runs fetch + render through the store for a request.

use std::{fmt::Display, future::Future, sync::Arc};

use serde::Serialize;
use tracing::debug;

use crate::infra::upstream::UpstreamError;

use super::config::{CacheConfig, CachePolicy};
use super::keys::{KeyBuilder, RequestIdentity, RouteParams, resolve_path};
use super::root_hash::RootHashMonitor;
use super::route::RouteSpec;
use super::store::{CacheStore, Lookup};

/// Media type of a rendered payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Json,
}

impl ContentKind {
    pub fn content_type(self) -> &'static str {
        match self {
            ContentKind::Html => "text/html; charset=utf-8",
            ContentKind::Json => "application/json",
        }
    }
}

/// Rendered response body as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    kind: ContentKind,
    body: Arc<str>,
}

impl Rendered {
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Html,
            body: Arc::from(body.into()),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Json,
            body: Arc::from(body.into()),
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Whether a response came from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Rendered content plus the cache metadata the transport layer surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsrResponse {
    pub content: Rendered,
    pub status: CacheStatus,
    pub cache_control: String,
}

impl IsrResponse {
    fn from_lookup(lookup: Lookup<Rendered>, policy: &CachePolicy) -> Self {
        let status = if lookup.from_cache {
            CacheStatus::Hit
        } else {
            CacheStatus::Miss
        };
        Self {
            content: lookup.value,
            status,
            cache_control: policy.cache_control(),
        }
    }

    /// Replace the body while keeping the cache metadata.
    pub fn with_content(mut self, content: Rendered) -> Self {
        self.content = content;
        self
    }
}

/// Snapshot served by the cache administration endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub stale_entries: usize,
    pub fresh_entries: usize,
    pub root_hash: Option<String>,
}

/// Shared ISR context, constructed once at startup and injected into handlers.
#[derive(Clone)]
pub struct IsrCache {
    store: CacheStore<Rendered>,
    monitor: Option<Arc<RootHashMonitor>>,
    keys: KeyBuilder,
    default_policy: CachePolicy,
}

impl IsrCache {
    pub fn new(config: &CacheConfig, monitor: Option<Arc<RootHashMonitor>>) -> Self {
        Self {
            store: CacheStore::new(config),
            monitor,
            keys: KeyBuilder::new(config.max_key_len),
            default_policy: config.default_policy(),
        }
    }

    pub fn store(&self) -> &CacheStore<Rendered> {
        &self.store
    }

    pub fn default_policy(&self) -> &CachePolicy {
        &self.default_policy
    }

    /// Handler bound to `policy`.
    pub fn handler(&self, policy: CachePolicy) -> IsrHandler {
        IsrHandler {
            cache: self.clone(),
            policy,
        }
    }

    /// Handler bound to the configured default policy.
    pub fn default_handler(&self) -> IsrHandler {
        self.handler(self.default_policy.clone())
    }

    /// Key the request layer uses for `identity` under `policy`.
    pub fn key_for(
        &self,
        policy: &CachePolicy,
        identity: &RequestIdentity,
        params: &RouteParams,
    ) -> String {
        self.keys.build(&policy.key_prefix, identity, params)
    }

    /// Serve a page route, caching only its rendered content.
    ///
    /// The caller wraps full-page requests in the page shell afterwards, so
    /// shell changes never touch cached entries.
    pub async fn cached_page(
        &self,
        route: &RouteSpec,
        identity: &RequestIdentity,
        params: RouteParams,
        base_url: &str,
    ) -> Result<IsrResponse, UpstreamError> {
        self.check_root(Some(base_url)).await;

        // Key on the decoded route params, as prewarming does, not on the
        // percent-encoded request path.
        let identity = RequestIdentity {
            path: resolve_path(&route.path, &params),
            ..identity.clone()
        };
        let key = self.key_for(&route.policy, &identity, &params);
        let loader = Arc::clone(&route.loader);
        let base_url = base_url.to_string();

        let lookup = self
            .store
            .get_or_fetch(&key, &route.policy, move || async move {
                loader.load(&base_url, &params).await
            })
            .await?;

        Ok(IsrResponse::from_lookup(lookup, &route.policy))
    }

    pub fn stats(&self) -> CacheStats {
        let stats = self.store.stats();
        CacheStats {
            total_entries: stats.total,
            expired_entries: stats.expired,
            stale_entries: stats.stale,
            fresh_entries: stats.fresh,
            root_hash: self.monitor.as_ref().and_then(|monitor| monitor.root_hash()),
        }
    }

    /// Drop every entry, or every entry whose key contains `pattern`.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        self.store.invalidate(pattern)
    }

    async fn check_root(&self, base_url: Option<&str>) {
        if let (Some(monitor), Some(base_url)) = (self.monitor.as_ref(), base_url) {
            monitor.check_invalidation(base_url, &self.store).await;
        }
    }
}

/// Caches fetch + render results for requests under one policy.
#[derive(Clone)]
pub struct IsrHandler {
    cache: IsrCache,
    policy: CachePolicy,
}

impl IsrHandler {
    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Serve `identity` from the cache, running `fetch` then `render` on a miss.
    ///
    /// With a `base_url` the root-hash monitor is consulted first. Errors from
    /// `fetch` or `render` are returned unchanged and never cached.
    pub async fn cached_response<D, E, Fetch, FetchFut, Render>(
        &self,
        identity: &RequestIdentity,
        params: RouteParams,
        base_url: Option<&str>,
        fetch: Fetch,
        render: Render,
    ) -> Result<IsrResponse, E>
    where
        Fetch: FnOnce(RouteParams) -> FetchFut + Send + 'static,
        FetchFut: Future<Output = Result<D, E>> + Send + 'static,
        Render: FnOnce(D) -> Result<Rendered, E> + Send + 'static,
        D: Send + 'static,
        E: Display + Send + 'static,
    {
        self.cache.check_root(base_url).await;

        let key = self.cache.key_for(&self.policy, identity, &params);
        debug!(cache = "isr", key = %key, partial = identity.partial, "resolving cached response");

        let lookup = self
            .cache
            .store
            .get_or_fetch(&key, &self.policy, move || async move {
                let data = fetch(params).await?;
                render(data)
            })
            .await?;

        Ok(IsrResponse::from_lookup(lookup, &self.policy))
    }

    /// [`cached_response`](Self::cached_response) with the fetched data
    /// serialized as the JSON body.
    pub async fn cached_json<D, E, Fetch, FetchFut>(
        &self,
        identity: &RequestIdentity,
        params: RouteParams,
        base_url: Option<&str>,
        fetch: Fetch,
    ) -> Result<IsrResponse, E>
    where
        Fetch: FnOnce(RouteParams) -> FetchFut + Send + 'static,
        FetchFut: Future<Output = Result<D, E>> + Send + 'static,
        D: Serialize + Send + 'static,
        E: From<serde_json::Error> + Display + Send + 'static,
    {
        self.cached_response(identity, params, base_url, fetch, |data: D| {
            Ok(Rendered::json(serde_json::to_string(&data)?))
        })
        .await
    }
}
