//! Per-client sliding-window rate limiting.
//!
//! Each client key keeps a log of request instants inside the window; a
//! request is admitted while the log holds fewer than `max_requests` entries.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use bookshelf_kernel::settings::RateLimitSettings;
use bookshelf_telemetry::HttpMetrics;

pub const RATE_LIMIT_MESSAGE: &str = "Too many requests, please try again later.";

/// Paths never counted against a client's budget.
const EXEMPT_PATHS: &[&str] = &["/healthz", "/metrics"];

/// Sweep idle keys once the table grows past this many clients.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
    metrics: Option<Arc<HttpMetrics>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            hits: Mutex::new(HashMap::new()),
            metrics: None,
        }
    }

    /// `None` when rate limiting is disabled.
    pub fn from_settings(settings: &RateLimitSettings) -> Option<Self> {
        settings
            .enabled
            .then(|| Self::new(Duration::from_secs(settings.window_secs), settings.max_requests))
    }

    pub fn with_metrics(mut self, metrics: Arc<HttpMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Record a request from `key` at `now`; `false` if it exceeds the budget.
    pub fn check(&self, key: &str, now: Instant) -> bool {
        let Ok(mut hits) = self.hits.lock() else {
            tracing::warn!("rate limiter state poisoned; admitting request");
            return true;
        };

        if hits.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            hits.retain(|_, log| log.back().is_some_and(|last| now.duration_since(*last) < window));
        }

        let log = hits.entry(key.to_string()).or_default();
        while let Some(oldest) = log.front() {
            if now.duration_since(*oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }

        if log.len() >= self.max_requests {
            return false;
        }

        log.push_back(now);
        true
    }

    pub fn is_exempt(path: &str) -> bool {
        EXEMPT_PATHS.contains(&path)
    }

    fn reject(&self, key: &str) -> Response {
        tracing::warn!(client = %key, "rate limit exceeded");
        if let Some(metrics) = &self.metrics {
            metrics.increment_rate_limited();
        }
        (StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_MESSAGE).into_response()
    }
}

/// Identify the caller: first `x-forwarded-for` hop, then the socket peer,
/// then the `host` header.
pub fn client_key(request: &Request) -> String {
    let headers = request.headers();

    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return forwarded.to_string();
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown-ip".to_string())
}

/// Middleware rejecting requests over the per-client budget with 429.
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if RateLimiter::is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let key = client_key(&request);
    if limiter.check(&key, Instant::now()) {
        next.run(request).await
    } else {
        limiter.reject(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    #[test]
    fn admits_up_to_budget_then_rejects() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        let start = Instant::now();

        assert!(limiter.check("10.0.0.1", start));
        assert!(limiter.check("10.0.0.1", start + Duration::from_secs(1)));
        assert!(limiter.check("10.0.0.1", start + Duration::from_secs(2)));
        assert!(!limiter.check("10.0.0.1", start + Duration::from_secs(3)));
    }

    #[test]
    fn clients_have_independent_budgets() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let now = Instant::now();

        assert!(limiter.check("10.0.0.1", now));
        assert!(!limiter.check("10.0.0.1", now));
        assert!(limiter.check("10.0.0.2", now));
    }

    #[test]
    fn window_slides() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 2);
        let start = Instant::now();

        assert!(limiter.check("client", start));
        assert!(limiter.check("client", start + Duration::from_secs(5)));
        assert!(!limiter.check("client", start + Duration::from_secs(9)));
        // first hit has aged out, second has not
        assert!(limiter.check("client", start + Duration::from_secs(10)));
        assert!(!limiter.check("client", start + Duration::from_secs(11)));
        assert!(limiter.check("client", start + Duration::from_secs(15)));
    }

    #[test]
    fn rejected_requests_do_not_extend_the_window() {
        let limiter = RateLimiter::new(Duration::from_secs(10), 1);
        let start = Instant::now();

        assert!(limiter.check("client", start));
        assert!(!limiter.check("client", start + Duration::from_secs(9)));
        assert!(limiter.check("client", start + Duration::from_secs(10)));
    }

    #[test]
    fn disabled_settings_build_nothing() {
        let settings = RateLimitSettings {
            enabled: false,
            ..RateLimitSettings::default()
        };
        assert!(RateLimiter::from_settings(&settings).is_none());
        assert!(RateLimiter::from_settings(&RateLimitSettings::default()).is_some());
    }

    #[test]
    fn client_key_prefers_forwarded_for() {
        let request = Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("host", "books.local")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.7");
    }

    #[test]
    fn client_key_uses_peer_address_then_host() {
        let mut request = Request::builder()
            .header("host", "books.local")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "books.local");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_key(&request), "192.0.2.1");

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_key(&bare), "unknown-ip");
    }

    #[test]
    fn health_and_metrics_are_exempt() {
        assert!(RateLimiter::is_exempt("/healthz"));
        assert!(RateLimiter::is_exempt("/metrics"));
        assert!(!RateLimiter::is_exempt("/books"));
    }
}
