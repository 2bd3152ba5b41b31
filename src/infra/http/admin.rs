//! Cache administration endpoints.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::CacheStats;

use super::HttpState;

pub(super) fn routes() -> Router<HttpState> {
    Router::new()
        .route("/api/v0/cache/stats", get(cache_stats))
        .route("/api/v0/cache/invalidate", post(invalidate_cache))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InvalidateQuery {
    pattern: Option<String>,
}

#[derive(Debug, Serialize)]
struct InvalidateResponse {
    status: &'static str,
    pattern: Option<String>,
    removed: usize,
}

async fn cache_stats(State(state): State<HttpState>) -> Json<CacheStats> {
    Json(state.isr.stats())
}

async fn invalidate_cache(
    State(state): State<HttpState>,
    Query(query): Query<InvalidateQuery>,
) -> Json<InvalidateResponse> {
    let pattern = query.pattern.filter(|pattern| !pattern.is_empty());
    let removed = state.isr.invalidate(pattern.as_deref());
    info!(
        target = "isr_cache::http::admin",
        pattern = pattern.as_deref().unwrap_or("*"),
        removed,
        "cache invalidated"
    );

    Json(InvalidateResponse {
        status: "ok",
        pattern,
        removed,
    })
}
