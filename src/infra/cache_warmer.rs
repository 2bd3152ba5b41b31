use std::time::Instant;

use futures::future::join_all;
use metrics::histogram;
use tracing::{debug, info, warn};

use crate::cache::{IsrCache, RequestIdentity, RouteKind, RouteParams, RouteSpec, resolve_path};

use super::upstream::UpstreamError;

pub(crate) const METRIC_PREWARM_MS: &str = "isr_cache_prewarm_ms";

/// A prewarm task that did not produce a cache entry.
#[derive(Debug)]
pub struct PrewarmFailure {
    pub path: String,
    pub error: UpstreamError,
}

#[derive(Debug, Default)]
pub struct PrewarmReport {
    pub succeeded: usize,
    pub failures: Vec<PrewarmFailure>,
}

impl PrewarmReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Explicitly registered page routes, seeded into the cache before serving.
#[derive(Debug, Default)]
pub struct PrewarmRegistry {
    routes: Vec<RouteSpec>,
}

impl PrewarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Registration order carries no meaning.
    pub fn register(&mut self, route: RouteSpec) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[RouteSpec] {
        &self.routes
    }

    /// Route registered under the template `path`.
    pub fn find(&self, path: &str) -> Option<&RouteSpec> {
        self.routes.iter().find(|route| route.path == path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Fetch, render and store every registered page concurrently.
    ///
    /// Dynamic routes are expanded through their enumerator first; an
    /// enumerator failure only skips that route. Individual page failures are
    /// collected into the report and never abort the others.
    pub async fn prewarm_all(&self, cache: &IsrCache, base_url: &str) -> PrewarmReport {
        info!(
            target = "isr_cache::cache_warmer",
            routes = self.routes.len(),
            "prewarming ISR cache"
        );
        let started_at = Instant::now();

        let mut tasks: Vec<(&RouteSpec, RouteParams)> = Vec::new();
        for route in &self.routes {
            match &route.kind {
                RouteKind::Static => tasks.push((route, RouteParams::new())),
                RouteKind::Dynamic(slugs) => match slugs.slugs(base_url).await {
                    Ok(all) => tasks.extend(all.into_iter().map(|params| (route, params))),
                    Err(error) => warn!(
                        target = "isr_cache::cache_warmer",
                        route = %route.path,
                        error = %error,
                        "slug enumeration failed; skipping dynamic route"
                    ),
                },
            }
        }

        let results = join_all(
            tasks
                .into_iter()
                .map(|(route, params)| prewarm_page(cache, base_url, route, params)),
        )
        .await;

        let mut report = PrewarmReport::default();
        for result in results {
            match result {
                Ok(()) => report.succeeded += 1,
                Err(failure) => {
                    warn!(
                        target = "isr_cache::cache_warmer",
                        path = %failure.path,
                        error = %failure.error,
                        "prewarm failed"
                    );
                    report.failures.push(failure);
                }
            }
        }

        let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
        histogram!(METRIC_PREWARM_MS).record(elapsed_ms);
        info!(
            target = "isr_cache::cache_warmer",
            succeeded = report.succeeded,
            failed = report.failed(),
            elapsed_ms,
            "prewarm finished"
        );

        report
    }
}

async fn prewarm_page(
    cache: &IsrCache,
    base_url: &str,
    route: &RouteSpec,
    params: RouteParams,
) -> Result<(), PrewarmFailure> {
    let path = resolve_path(&route.path, &params);
    let key = cache.key_for(&route.policy, &RequestIdentity::new(path.as_str()), &params);

    if cache.store().contains(&key) {
        debug!(target = "isr_cache::cache_warmer", path = %path, "already cached");
        return Ok(());
    }

    match route.loader.load(base_url, &params).await {
        Ok(rendered) => {
            cache.store().set_with_policy(&key, rendered, &route.policy);
            Ok(())
        }
        Err(error) => Err(PrewarmFailure { path, error }),
    }
}
