//! Request counters exposed in the Prometheus text format.
//!
//! - Counters only, monotonic, reset on process start
//! - Rendering is deterministic: label sets are sorted

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const PREFIX: &str = "bookshelf";

/// Methods counted under their own label; anything else is `OTHER`.
const KNOWN_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "CONNECT", "TRACE",
];
const OTHER_METHOD: &str = "OTHER";

fn method_label(method: &str) -> &str {
    KNOWN_METHODS
        .iter()
        .copied()
        .find(|known| *known == method)
        .unwrap_or(OTHER_METHOD)
}

/// HTTP request counters shared by the metrics middleware and `/metrics`.
#[derive(Debug, Default)]
pub struct HttpMetrics {
    /// (method, status) -> count
    requests: Mutex<BTreeMap<(String, u16), u64>>,
    duration_micros_sum: AtomicU64,
    duration_count: AtomicU64,
    rate_limited: AtomicU64,
}

impl HttpMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed request.
    pub fn record_request(&self, method: &str, status: u16, elapsed: Duration) {
        let method = method_label(method);
        if let Ok(mut requests) = self.requests.lock() {
            *requests.entry((method.to_string(), status)).or_insert(0) += 1;
        }
        self.duration_micros_sum
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.duration_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    /// Total requests recorded for `method` and `status`.
    pub fn requests(&self, method: &str, status: u16) -> u64 {
        self.requests
            .lock()
            .ok()
            .and_then(|requests| requests.get(&(method.to_string(), status)).copied())
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> u64 {
        self.duration_count.load(Ordering::Relaxed)
    }

    pub fn rate_limited(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    /// Render all counters in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "# HELP {PREFIX}_http_requests_total Total HTTP requests handled."
        );
        let _ = writeln!(out, "# TYPE {PREFIX}_http_requests_total counter");
        if let Ok(requests) = self.requests.lock() {
            for ((method, status), count) in requests.iter() {
                let _ = writeln!(
                    out,
                    "{PREFIX}_http_requests_total{{method=\"{method}\",status=\"{status}\"}} {count}"
                );
            }
        }

        let sum_secs = self.duration_micros_sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(
            out,
            "# HELP {PREFIX}_http_request_duration_seconds Time spent handling HTTP requests."
        );
        let _ = writeln!(out, "# TYPE {PREFIX}_http_request_duration_seconds summary");
        let _ = writeln!(out, "{PREFIX}_http_request_duration_seconds_sum {sum_secs}");
        let _ = writeln!(
            out,
            "{PREFIX}_http_request_duration_seconds_count {}",
            self.total_requests()
        );

        let _ = writeln!(
            out,
            "# HELP {PREFIX}_http_requests_rate_limited_total Requests rejected by the rate limiter."
        );
        let _ = writeln!(out, "# TYPE {PREFIX}_http_requests_rate_limited_total counter");
        let _ = writeln!(
            out,
            "{PREFIX}_http_requests_rate_limited_total {}",
            self.rate_limited()
        );

        out
    }
}
