use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use httpmock::MockServer;
use isr_cache::{
    application::blog,
    cache::{CacheConfig, IsrCache, RootHashMonitor},
    infra::{
        cache_warmer::PrewarmRegistry,
        http::{HttpState, build_router},
        upstream::UpstreamClient,
    },
};
use serde_json::Value;
use tower::ServiceExt;

const LISTING: &str = r#"[
    {"path": "tech", "is_dir": true},
    {
        "path": "tech/rust",
        "is_dir": false,
        "object": {
            "created_at": "2024-03-01T00:00:00Z",
            "properties": {"title": "Rust notes", "description": "Ownership", "tags": ["lang"]}
        }
    }
]"#;

const CATEGORY_LISTING: &str = r#"[
    {
        "path": "tech/rust",
        "is_dir": false,
        "object": {
            "created_at": "2024-03-01T00:00:00Z",
            "properties": {"title": "Rust notes", "description": "Ownership", "tags": ["lang"]}
        }
    }
]"#;

async fn upstream() -> MockServer {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/api/v0/root");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"hash":"root-1"}"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/blog").query_param("deep", "true");
            then.status(200)
                .header("content-type", "application/json")
                .body(LISTING);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/blog/tech");
            then.status(200)
                .header("content-type", "application/json")
                .body(CATEGORY_LISTING);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/blog/tech/rust")
                .query_param("html", "true");
            then.status(200).body("<p>borrowed, not owned</p>");
        })
        .await;
    server
}

fn app(base_url: Option<&str>) -> (Router, IsrCache) {
    let config = CacheConfig::default();
    let upstream = Arc::new(UpstreamClient::new(Duration::from_secs(5)).expect("client"));
    let monitor = Arc::new(RootHashMonitor::new(
        upstream.clone(),
        config.root_check_interval(),
    ));
    let isr = IsrCache::new(&config, Some(monitor));

    let mut registry = PrewarmRegistry::new();
    blog::register_routes(&mut registry, Arc::clone(&upstream), isr.default_policy());

    let state = HttpState::new(isr.clone(), Arc::new(registry), upstream, base_url);
    (build_router(state), isr)
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn x_cache(response: &Response) -> &str {
    response
        .headers()
        .get("x-cache")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn blog_index_is_cached_and_wrapped_in_shell() {
    let server = upstream().await;
    let (router, _) = app(Some(&server.base_url()));

    let first = send(&router, get("/blog")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(
        first.headers().get("cache-control").and_then(|v| v.to_str().ok()),
        Some("public, max-age=3600, stale-while-revalidate=60")
    );
    assert!(
        first.headers()[CONTENT_TYPE]
            .to_str()
            .expect("content type")
            .starts_with("text/html")
    );
    let page = body_text(first).await;
    assert!(page.contains("<html"));
    assert!(page.contains(r#"href="/blog/tech/rust""#));

    let second = send(&router, get("/blog")).await;
    assert_eq!(x_cache(&second), "HIT");
}

#[tokio::test]
async fn partial_requests_get_the_bare_fragment() {
    let server = upstream().await;
    let (router, isr) = app(Some(&server.base_url()));

    send(&router, get("/blog")).await;

    let request = Request::builder()
        .uri("/blog")
        .header("HX-Request", "true")
        .body(Body::empty())
        .expect("request");
    let response = send(&router, request).await;

    assert_eq!(x_cache(&response), "MISS");
    let fragment = body_text(response).await;
    assert!(!fragment.contains("<html"));
    assert!(fragment.contains("Rust notes"));
    assert_eq!(isr.stats().total_entries, 2);
}

#[tokio::test]
async fn blog_post_renders_upstream_html() {
    let server = upstream().await;
    let (router, _) = app(Some(&server.base_url()));

    let response = send(&router, get("/blog/tech/rust")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let page = body_text(response).await;
    assert!(page.contains("<p>borrowed, not owned</p>"));
    assert!(page.contains("rust · Blog"));
}

#[tokio::test]
async fn unknown_post_is_not_found_and_not_cached() {
    let server = upstream().await;
    let (router, isr) = app(Some(&server.base_url()));

    let response = send(&router, get("/blog/tech/missing")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(isr.stats().total_entries, 0);
}

#[tokio::test]
async fn component_endpoint_serves_cached_json() {
    let server = upstream().await;
    let (router, _) = app(Some(&server.base_url()));

    let first = send(&router, get("/api/v0/blog/posts")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(
        first.headers()[CONTENT_TYPE].to_str().expect("content type"),
        "application/json"
    );
    let posts: Value = serde_json::from_str(&body_text(first).await).expect("json");
    assert_eq!(posts[0]["name"], "rust");
    assert_eq!(posts[0]["category"], "tech");

    let second = send(&router, get("/api/v0/blog/posts")).await;
    assert_eq!(x_cache(&second), "HIT");
}

#[tokio::test]
async fn stats_and_invalidate_endpoints() {
    let server = upstream().await;
    let (router, _) = app(Some(&server.base_url()));

    send(&router, get("/blog")).await;
    send(&router, get("/api/v0/blog/posts")).await;

    let stats = send(&router, get("/api/v0/cache/stats")).await;
    assert_eq!(stats.status(), StatusCode::OK);
    let stats: Value = serde_json::from_str(&body_text(stats).await).expect("json");
    assert_eq!(stats["total_entries"], 2);
    assert_eq!(stats["fresh_entries"], 2);
    assert_eq!(stats["root_hash"], "root-1");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v0/cache/invalidate?pattern=api")
        .body(Body::empty())
        .expect("request");
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pattern"], "api");
    assert_eq!(body["removed"], 1);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v0/cache/invalidate")
        .body(Body::empty())
        .expect("request");
    let body: Value =
        serde_json::from_str(&body_text(send(&router, request).await).await).expect("json");
    assert_eq!(body["pattern"], Value::Null);
    assert_eq!(body["removed"], 1);
}

#[tokio::test]
async fn health_endpoints_report_ok() {
    let (router, _) = app(None);

    for uri in ["/_status/health", "/_status/healthz"] {
        let response = send(&router, get(uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(body["status"], "ok");
    }
}

#[tokio::test]
async fn content_routes_need_an_upstream() {
    let (router, _) = app(None);

    let response = send(&router, get("/blog")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unmatched_paths_render_not_found_page() {
    let (router, _) = app(None);

    let response = send(&router, get("/nowhere")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("/nowhere"));
}

#[tokio::test]
async fn prewarmed_pages_are_served_as_hits() {
    let server = upstream().await;
    let base_url = server.base_url();
    let config = CacheConfig::default();
    let upstream = Arc::new(UpstreamClient::new(Duration::from_secs(5)).expect("client"));
    let isr = IsrCache::new(&config, None);
    let mut registry = PrewarmRegistry::new();
    blog::register_routes(&mut registry, Arc::clone(&upstream), isr.default_policy());

    let report = registry.prewarm_all(&isr, &base_url).await;
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed(), 0);

    let state = HttpState::new(isr, Arc::new(registry), upstream, Some(&base_url));
    let router = build_router(state);

    for uri in ["/blog", "/blog/tech/rust"] {
        let response = send(&router, get(uri)).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert_eq!(x_cache(&response), "HIT", "{uri}");
    }
}
