//! HTTP server facade for bookshelf with Axum, error handling, and OpenAPI support.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Router};

use bookshelf_kernel::{settings::Settings, ModuleRegistry};
use bookshelf_telemetry::HttpMetrics;

pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod router;

use rate_limit::RateLimiter;
use router::RouterBuilder;

pub const WELCOME_MESSAGE: &str = "Bookshelf server is running.";

/// Start the HTTP server and run until ctrl-c or SIGTERM.
pub async fn start_server(
    registry: &ModuleRegistry,
    settings: &Settings,
    metrics: Option<Arc<HttpMetrics>>,
) -> anyhow::Result<()> {
    let app = build_router(registry, settings, metrics);

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind to {address}"))?;

    tracing::info!("HTTP server listening on http://{}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Build the main HTTP router with all module routes mounted
pub fn build_router(
    registry: &ModuleRegistry,
    settings: &Settings,
    metrics: Option<Arc<HttpMetrics>>,
) -> Router {
    let mut router_builder = RouterBuilder::new()
        .route("/", get(welcome))
        .route("/healthz", get(health_check));

    for module in registry.modules() {
        let module_name = module.name();
        tracing::info!(
            module = module_name,
            "mounting module routes under /{0} and /api/{0}",
            module_name
        );
        router_builder = router_builder.mount_module(module_name, module.routes());
    }

    router_builder = router_builder.with_openapi(registry);

    if let Some(limiter) = RateLimiter::from_settings(&settings.rate_limit) {
        let limiter = match &metrics {
            Some(metrics) => limiter.with_metrics(metrics.clone()),
            None => limiter,
        };
        router_builder = router_builder.with_rate_limit(Arc::new(limiter));
    }

    if let Some(metrics) = metrics {
        router_builder = router_builder.with_metrics(metrics);
    }

    router_builder
        .with_timeout(settings.server.request_timeout_ms)
        .with_cors()
        .with_tracing()
        .with_request_id()
        .build()
}

async fn welcome() -> &'static str {
    WELCOME_MESSAGE
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
