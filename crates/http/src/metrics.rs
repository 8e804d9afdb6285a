//! Request metrics middleware and the `/metrics` endpoint.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use bookshelf_telemetry::HttpMetrics;

/// Count every response by method and status.
pub async fn record_metrics(
    State(metrics): State<Arc<HttpMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    metrics.record_request(method.as_str(), response.status().as_u16(), started.elapsed());
    response
}

/// GET /metrics
pub async fn render_metrics(State(metrics): State<Arc<HttpMetrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        metrics.render(),
    )
}
