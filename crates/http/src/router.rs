//! Router builder for the bookshelf HTTP server

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::OriginalUri,
    http::{HeaderValue, Request, Response, StatusCode},
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Span;
use uuid::{Timestamp, Uuid};

use bookshelf_kernel::ModuleRegistry;
use bookshelf_telemetry::HttpMetrics;

use crate::metrics::{record_metrics, render_metrics};
use crate::rate_limit::{enforce_rate_limit, RateLimiter};

/// Builder for constructing the main HTTP router.
///
/// Routes may be added in any order; middleware is applied in [`build`]
/// so it covers every route and the not-found fallback. Outermost first:
/// request id, tracing, CORS, timeout, metrics, rate limiting.
///
/// [`build`]: RouterBuilder::build
pub struct RouterBuilder {
    router: Router,
    request_id: bool,
    tracing: bool,
    cors: bool,
    timeout: Option<Duration>,
    metrics: Option<Arc<HttpMetrics>>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            request_id: false,
            tracing: false,
            cors: false,
            timeout: None,
            metrics: None,
            rate_limiter: None,
        }
    }

    pub fn route(mut self, path: &str, route: axum::routing::MethodRouter) -> Self {
        self.router = self.router.route(path, route);
        self
    }

    /// Mount a module's router under both `/{name}` and `/api/{name}`.
    pub fn mount_module(mut self, module_name: &str, module_router: Router) -> Self {
        self.router = self
            .router
            .nest(&format!("/{}", module_name), module_router.clone())
            .nest(&format!("/api/{}", module_name), module_router);
        self
    }

    /// Log one span per request with method and path, and one event per
    /// response with status and latency.
    pub fn with_tracing(mut self) -> Self {
        self.tracing = true;
        self
    }

    pub fn with_cors(mut self) -> Self {
        self.cors = true;
        self
    }

    /// Tag requests and responses with an `x-request-id` (UUID v7).
    pub fn with_request_id(mut self) -> Self {
        self.request_id = true;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(Duration::from_millis(timeout_ms));
        self
    }

    /// Count requests into `metrics` and expose them at `/metrics`.
    pub fn with_metrics(mut self, metrics: Arc<HttpMetrics>) -> Self {
        self.router = self
            .router
            .route("/metrics", get(render_metrics).with_state(metrics.clone()));
        self.metrics = Some(metrics);
        self
    }

    pub fn with_rate_limit(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Add OpenAPI documentation by collecting specs from all modules
    pub fn with_openapi(mut self, registry: &ModuleRegistry) -> Self {
        let openapi_spec = collect_openapi(registry);

        // Deserialize our JSON spec into a utoipa OpenApi object for Swagger UI
        let openapi_obj: utoipa::openapi::OpenApi = serde_json::from_value(openapi_spec.clone())
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "merged OpenAPI document is invalid; serving a stub");
                utoipa::openapi::OpenApiBuilder::new()
                    .info(
                        utoipa::openapi::InfoBuilder::new()
                            .title("Bookshelf API")
                            .version("1.0.0")
                            .build(),
                    )
                    .build()
            });

        self.router = self.router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi_obj),
        );

        // Raw JSON spec for external consumers
        self.router = self.router.route(
            "/docs/openapi.json",
            get(move || async move { Json(openapi_spec.clone()) }),
        );

        self
    }

    /// Build the final router
    pub fn build(self) -> Router {
        // A known path with an unknown verb is also a missing route.
        let mut router = self
            .router
            .method_not_allowed_fallback(route_not_found)
            .fallback(route_not_found);

        if let Some(limiter) = self.rate_limiter {
            router = router.layer(middleware::from_fn_with_state(limiter, enforce_rate_limit));
        }

        if let Some(metrics) = self.metrics {
            router = router.layer(middleware::from_fn_with_state(metrics, record_metrics));
        }

        if let Some(timeout) = self.timeout {
            router = router.layer(TimeoutLayer::new(timeout));
        }

        if self.cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.tracing {
            router = router.layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "http_request",
                            method = %request.method(),
                            path = %request.uri().path(),
                            request_id = %request_id,
                        )
                    })
                    .on_request(())
                    .on_response(|response: &Response<Body>, latency: Duration, _span: &Span| {
                        tracing::info!(
                            status = response.status().as_u16(),
                            duration_ms = latency.as_millis() as u64,
                            "request completed"
                        );
                    }),
            );
        }

        if self.request_id {
            router = router
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7));
        }

        router
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fallback for every unmatched path or verb.
pub async fn route_not_found(OriginalUri(uri): OriginalUri) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "Route not found",
            "path": uri.path(),
        })),
    )
}

/// Merge every module's OpenAPI fragment into one document.
///
/// Module paths are relative to the module mount point and are published
/// under `/api/{module}`.
fn collect_openapi(registry: &ModuleRegistry) -> serde_json::Value {
    let mut openapi_spec = json!({
        "openapi": "3.0.0",
        "info": {
            "title": "Bookshelf API",
            "version": "1.0.0",
            "description": "Book catalogue API"
        },
        "paths": {},
        "components": {
            "schemas": {}
        }
    });

    openapi_spec["components"]["schemas"]["ErrorResponse"] = json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "message": { "type": "string" },
            "code": { "type": "string" },
            "details": { "type": "array", "items": {} },
            "trace_id": { "type": "string" },
            "timestamp": { "type": "string" }
        },
        "required": ["success", "message", "code", "trace_id", "timestamp"]
    });

    openapi_spec["paths"]["/healthz"] = json!({
        "get": {
            "summary": "Health check",
            "responses": {
                "200": {
                    "description": "OK",
                    "content": { "text/plain": { "schema": { "type": "string" } } }
                }
            }
        }
    });

    for module in registry.modules() {
        let Some(module_spec) = module.openapi() else {
            continue;
        };

        if let Some(paths) = module_spec.get("paths").and_then(|p| p.as_object()) {
            for (path, path_item) in paths {
                let prefixed_path = join_path(&format!("/api/{}", module.name()), path);
                openapi_spec["paths"][prefixed_path] = path_item.clone();
            }
        }

        if let Some(schemas) = module_spec
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(|s| s.as_object())
        {
            for (schema_name, schema_def) in schemas {
                openapi_spec["components"]["schemas"][schema_name] = schema_def.clone();
            }
        }
    }

    openapi_spec
}

fn join_path(prefix: &str, path: &str) -> String {
    if path == "/" || path.is_empty() {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, path)
    }
}

/// Request ID generator producing time-ordered UUIDs
#[derive(Clone, Copy)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let timestamp = Timestamp::now(uuid::NoContext);
        let request_id = Uuid::new_v7(timestamp)
            .to_string()
            .parse::<HeaderValue>()
            .ok()?;
        Some(RequestId::new(request_id))
    }
}
