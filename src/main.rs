use std::{future::IntoFuture, process, sync::Arc};

use isr_cache::{
    application::{blog, error::AppError},
    cache::{CacheConfig, IsrCache, RootHashMonitor, RootHashSource, RouteKind},
    config,
    infra::{
        cache_warmer::PrewarmRegistry,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        upstream::UpstreamClient,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let app = build_application_context(&settings)?;

    match command {
        config::Command::Serve(_) => run_serve(settings, app).await,
        config::Command::Routes => {
            print_routes(&app.registry);
            Ok(())
        }
    }
}

struct ApplicationContext {
    isr: IsrCache,
    registry: Arc<PrewarmRegistry>,
    upstream: Arc<UpstreamClient>,
    cache_config: CacheConfig,
}

fn build_application_context(settings: &config::Settings) -> Result<ApplicationContext, AppError> {
    let upstream = Arc::new(UpstreamClient::new(settings.upstream.timeout)?);
    let cache_config = CacheConfig::from(&settings.cache);

    // Without an upstream there is nothing to fingerprint.
    let monitor = settings.upstream.base_url.as_ref().map(|_| {
        let source: Arc<dyn RootHashSource> = upstream.clone();
        Arc::new(RootHashMonitor::new(
            source,
            cache_config.root_check_interval(),
        ))
    });

    let isr = IsrCache::new(&cache_config, monitor);

    let mut registry = PrewarmRegistry::new();
    blog::register_routes(&mut registry, Arc::clone(&upstream), isr.default_policy());

    Ok(ApplicationContext {
        isr,
        registry: Arc::new(registry),
        upstream,
        cache_config,
    })
}

fn print_routes(registry: &PrewarmRegistry) {
    for route in registry.routes() {
        let kind = match route.kind {
            RouteKind::Static => "static",
            RouteKind::Dynamic(_) => "dynamic",
        };
        println!("{:<32} {:<20} {kind}", route.path, route.template);
    }
}

async fn run_serve(settings: config::Settings, app: ApplicationContext) -> Result<(), AppError> {
    let base_url = settings.upstream.base_url.as_deref();

    match base_url {
        Some(base_url) if app.cache_config.should_prewarm() => {
            let report = app.registry.prewarm_all(&app.isr, base_url).await;
            if report.failed() > 0 {
                warn!(
                    target = "isr_cache::serve",
                    failed = report.failed(),
                    "starting with a partially warm cache"
                );
            }
        }
        Some(_) => info!(
            target = "isr_cache::serve",
            dev_mode = app.cache_config.dev_mode,
            "startup prewarm disabled"
        ),
        None => warn!(
            target = "isr_cache::serve",
            "upstream.base_url not set; skipping prewarm and serving 503 for content routes"
        ),
    }

    let state = HttpState::new(app.isr, app.registry, app.upstream, base_url);
    serve_http(&settings, state).await
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "isr_cache::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let stop = Arc::new(Notify::new());
    let stopped = Arc::clone(&stop);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move { stopped.notified().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        () = shutdown_signal() => {}
    }

    // Background revalidations still running are abandoned with the runtime.
    stop.notify_one();
    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            info!(target = "isr_cache::serve", "shutdown complete");
        }
        Err(_) => warn!(
            target = "isr_cache::serve",
            timeout_secs = settings.server.graceful_shutdown.as_secs(),
            "graceful shutdown timed out; dropping open connections"
        ),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "isr_cache::serve", error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(target = "isr_cache::serve", error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(target = "isr_cache::serve", "received Ctrl-C; shutting down"),
        () = terminate => info!(target = "isr_cache::serve", "received SIGTERM; shutting down"),
    }
}
