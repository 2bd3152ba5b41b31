mod admin;
mod middleware;
mod public;

pub use public::{HttpState, build_router};

use axum::Json;
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::application::error::HttpError;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn upstream_unconfigured(source: &'static str) -> HttpError {
    HttpError::new(
        source,
        StatusCode::SERVICE_UNAVAILABLE,
        "Upstream content source not configured",
        "upstream.base_url is not set",
    )
}
