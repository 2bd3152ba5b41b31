use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::Uri,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    application::{
        blog::{self, BLOG_INDEX, BLOG_POST},
        error::HttpError,
    },
    cache::{IsrCache, IsrHandler, RequestIdentity, RouteParams},
    infra::{
        cache_warmer::PrewarmRegistry,
        upstream::{UpstreamClient, UpstreamError},
    },
    presentation::views::{render_not_found_response, wrap_in_shell},
};

use super::{
    admin, health,
    middleware::{log_responses, set_request_context},
    upstream_unconfigured,
};

#[derive(Clone)]
pub struct HttpState {
    pub isr: IsrCache,
    pub api: IsrHandler,
    pub registry: Arc<PrewarmRegistry>,
    pub upstream: Arc<UpstreamClient>,
    pub base_url: Option<Arc<str>>,
}

impl HttpState {
    pub fn new(
        isr: IsrCache,
        registry: Arc<PrewarmRegistry>,
        upstream: Arc<UpstreamClient>,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            api: isr.default_handler(),
            isr,
            registry,
            upstream,
            base_url: base_url.map(Arc::from),
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route(BLOG_INDEX, get(blog_index))
        .route(BLOG_POST, get(blog_post))
        .route("/api/v0/blog/posts", get(api_posts))
        .route("/api/v0/blog/posts/{category}/{name}", get(api_post))
        .route("/_status/health", get(health))
        .route("/_status/healthz", get(health))
        .merge(admin::routes())
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn blog_index(State(state): State<HttpState>, identity: RequestIdentity) -> Response {
    serve_page(&state, BLOG_INDEX, identity, RouteParams::new()).await
}

async fn blog_post(
    State(state): State<HttpState>,
    Path(params): Path<RouteParams>,
    identity: RequestIdentity,
) -> Response {
    serve_page(&state, BLOG_POST, identity, params).await
}

/// Serve a registered page route. Partial requests get the cached fragment,
/// full requests get it wrapped in the page shell.
async fn serve_page(
    state: &HttpState,
    route_path: &str,
    identity: RequestIdentity,
    params: RouteParams,
) -> Response {
    const SOURCE: &str = "infra::http::public::serve_page";

    let Some(base_url) = state.base_url.as_deref() else {
        return upstream_unconfigured(SOURCE).into_response();
    };
    let Some(route) = state.registry.find(route_path) else {
        return render_not_found_response(&identity.path, "route is not registered");
    };

    let partial = identity.partial;
    let title = blog::page_title(&params);

    match state.isr.cached_page(route, &identity, params, base_url).await {
        Ok(response) if partial => response.into_response(),
        Ok(response) => match wrap_in_shell(&title, &response.content) {
            Ok(page) => response.with_content(page).into_response(),
            Err(err) => err.into_response(),
        },
        Err(UpstreamError::NotFound(detail)) => render_not_found_response(&identity.path, &detail),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn api_posts(State(state): State<HttpState>, identity: RequestIdentity) -> Response {
    const SOURCE: &str = "infra::http::public::api_posts";

    let Some(base_url) = state.base_url.clone() else {
        return upstream_unconfigured(SOURCE).into_response();
    };
    let upstream = Arc::clone(&state.upstream);
    let fetch_base = Arc::clone(&base_url);

    let result = state
        .api
        .cached_json(
            &identity,
            RouteParams::new(),
            Some(&*base_url),
            move |_params| async move { upstream.list_posts(&fetch_base).await },
        )
        .await;

    match result {
        Ok(response) => response.into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn api_post(
    State(state): State<HttpState>,
    Path(params): Path<RouteParams>,
    identity: RequestIdentity,
) -> Response {
    const SOURCE: &str = "infra::http::public::api_post";

    let Some(base_url) = state.base_url.clone() else {
        return upstream_unconfigured(SOURCE).into_response();
    };
    let upstream = Arc::clone(&state.upstream);
    let fetch_base = Arc::clone(&base_url);

    let result = state
        .api
        .cached_json(
            &identity,
            params,
            Some(&*base_url),
            move |params: RouteParams| async move {
                blog::read_post(&upstream, &fetch_base, &params).await
            },
        )
        .await;

    match result {
        Ok(response) => response.into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn fallback(uri: Uri) -> Response {
    render_not_found_response(uri.path(), "no route matched")
}
