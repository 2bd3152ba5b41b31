//! Declarative description of a cacheable page route.
//!
//! Data fetching and rendering take explicit parameters (base URL, route
//! parameters) so live requests and startup prewarming share one code path.

use std::{fmt, future::Future, marker::PhantomData, sync::Arc};

use async_trait::async_trait;

use crate::infra::upstream::UpstreamError;

use super::config::CachePolicy;
use super::isr::Rendered;
use super::keys::RouteParams;

/// Fetches upstream data for one route and renders it to content.
#[async_trait]
pub trait PageLoader: Send + Sync {
    async fn load(&self, base_url: &str, params: &RouteParams) -> Result<Rendered, UpstreamError>;
}

/// Lists the parameter tuples of a dynamic route.
#[async_trait]
pub trait SlugEnumerator: Send + Sync {
    async fn slugs(&self, base_url: &str) -> Result<Vec<RouteParams>, UpstreamError>;
}

/// Combine a data fetcher and a renderer into a [`PageLoader`].
pub fn page_loader<F, Fut, D, R>(fetch: F, render: R) -> Arc<dyn PageLoader>
where
    F: Fn(String, RouteParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<D, UpstreamError>> + Send + 'static,
    R: Fn(D) -> Result<Rendered, UpstreamError> + Send + Sync + 'static,
    D: Send + 'static,
{
    Arc::new(FetchRender {
        fetch,
        render,
        _data: PhantomData,
    })
}

/// Wrap an async closure as a [`SlugEnumerator`].
pub fn slug_enumerator<F, Fut>(list: F) -> Arc<dyn SlugEnumerator>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<RouteParams>, UpstreamError>> + Send + 'static,
{
    Arc::new(SlugFn(list))
}

struct FetchRender<F, R, D> {
    fetch: F,
    render: R,
    _data: PhantomData<fn() -> D>,
}

#[async_trait]
impl<F, Fut, D, R> PageLoader for FetchRender<F, R, D>
where
    F: Fn(String, RouteParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<D, UpstreamError>> + Send + 'static,
    R: Fn(D) -> Result<Rendered, UpstreamError> + Send + Sync + 'static,
    D: Send + 'static,
{
    async fn load(&self, base_url: &str, params: &RouteParams) -> Result<Rendered, UpstreamError> {
        let data = (self.fetch)(base_url.to_string(), params.clone()).await?;
        (self.render)(data)
    }
}

struct SlugFn<F>(F);

#[async_trait]
impl<F, Fut> SlugEnumerator for SlugFn<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<RouteParams>, UpstreamError>> + Send + 'static,
{
    async fn slugs(&self, base_url: &str) -> Result<Vec<RouteParams>, UpstreamError> {
        (self.0)(base_url.to_string()).await
    }
}

/// How a route's concrete paths are discovered.
#[derive(Clone)]
pub enum RouteKind {
    /// One path, no parameters.
    Static,
    /// One path per parameter tuple returned by the enumerator.
    Dynamic(Arc<dyn SlugEnumerator>),
}

/// A page route whose rendered content is cached and prewarmed.
#[derive(Clone)]
pub struct RouteSpec {
    /// Route template with `{param}` placeholders.
    pub path: String,
    /// Name of the template the loader renders with.
    pub template: &'static str,
    pub policy: CachePolicy,
    pub kind: RouteKind,
    pub loader: Arc<dyn PageLoader>,
}

impl RouteSpec {
    pub fn fixed(
        path: impl Into<String>,
        template: &'static str,
        policy: CachePolicy,
        loader: Arc<dyn PageLoader>,
    ) -> Self {
        Self {
            path: path.into(),
            template,
            policy,
            kind: RouteKind::Static,
            loader,
        }
    }

    pub fn dynamic(
        path: impl Into<String>,
        template: &'static str,
        policy: CachePolicy,
        slugs: Arc<dyn SlugEnumerator>,
        loader: Arc<dyn PageLoader>,
    ) -> Self {
        Self {
            path: path.into(),
            template,
            policy,
            kind: RouteKind::Dynamic(slugs),
            loader,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, RouteKind::Dynamic(_))
    }
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("path", &self.path)
            .field("template", &self.template)
            .field("policy", &self.policy)
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}
