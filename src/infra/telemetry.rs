use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_FETCH_MS, METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATE, METRIC_CACHE_MISS,
    METRIC_CACHE_REVALIDATE, METRIC_CACHE_STALE, METRIC_ROOT_INVALIDATION,
};
use crate::config::{LogFormat, LoggingSettings};

use super::cache_warmer::METRIC_PREWARM_MS;
use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of requests served from the ISR cache, fresh or stale."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of requests that fetched synchronously."
        );
        describe_counter!(
            METRIC_CACHE_STALE,
            Unit::Count,
            "Total number of stale reads that scheduled a background revalidation."
        );
        describe_counter!(
            METRIC_CACHE_REVALIDATE,
            Unit::Count,
            "Background revalidations by outcome (refreshed, skipped, failed)."
        );
        describe_counter!(
            METRIC_ROOT_INVALIDATION,
            Unit::Count,
            "Total number of full clears caused by an upstream root hash change."
        );
        describe_counter!(
            METRIC_CACHE_INVALIDATE,
            Unit::Count,
            "Explicit invalidations by scope (all, pattern)."
        );
        describe_histogram!(
            METRIC_CACHE_FETCH_MS,
            Unit::Milliseconds,
            "Upstream fetch and render latency in milliseconds, by mode."
        );
        describe_histogram!(
            METRIC_PREWARM_MS,
            Unit::Milliseconds,
            "Startup prewarm duration in milliseconds."
        );
    });
}
