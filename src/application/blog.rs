//! Blog routes and their registration with the prewarm registry.

use std::sync::Arc;

use crate::cache::{CachePolicy, RouteParams, RouteSpec, page_loader, slug_enumerator};
use crate::domain::blog::BlogPost;
use crate::infra::cache_warmer::PrewarmRegistry;
use crate::infra::upstream::{UpstreamClient, UpstreamError};
use crate::presentation::views::{render_blog_index, render_blog_post};

pub const BLOG_INDEX: &str = "/blog";
pub const BLOG_POST: &str = "/blog/{category}/{name}";

/// Register the blog page routes under `policy`.
pub fn register_routes(
    registry: &mut PrewarmRegistry,
    upstream: Arc<UpstreamClient>,
    policy: &CachePolicy,
) {
    let index_upstream = Arc::clone(&upstream);
    registry.register(RouteSpec::fixed(
        BLOG_INDEX,
        "blog/index.html",
        policy.clone(),
        page_loader(
            move |base_url: String, _params: RouteParams| {
                let upstream = Arc::clone(&index_upstream);
                async move { upstream.list_posts(&base_url).await }
            },
            render_blog_index,
        ),
    ));

    let slugs_upstream = Arc::clone(&upstream);
    registry.register(RouteSpec::dynamic(
        BLOG_POST,
        "blog/post.html",
        policy.clone(),
        slug_enumerator(move |base_url: String| {
            let upstream = Arc::clone(&slugs_upstream);
            async move {
                let posts = upstream.list_posts(&base_url).await?;
                Ok(posts.iter().map(BlogPost::route_params).collect::<Vec<_>>())
            }
        }),
        page_loader(
            move |base_url: String, params: RouteParams| {
                let upstream = Arc::clone(&upstream);
                async move { read_post(&upstream, &base_url, &params).await }
            },
            render_blog_post,
        ),
    ));
}

/// Fetch the post addressed by `category` and `name` route parameters.
pub async fn read_post(
    upstream: &UpstreamClient,
    base_url: &str,
    params: &RouteParams,
) -> Result<BlogPost, UpstreamError> {
    let (Some(category), Some(name)) = (params.get("category"), params.get("name")) else {
        return Err(UpstreamError::NotFound(format!("{params:?}")));
    };
    upstream.read_post(base_url, category, name).await
}

/// Title shown in the page shell for a route's concrete parameters.
pub fn page_title(params: &RouteParams) -> String {
    params
        .get("name")
        .map(|name| name.replace(['-', '_'], " "))
        .unwrap_or_default()
}
