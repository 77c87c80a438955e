//! Prometheus metrics for the API server.

use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "crowdguard_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "crowdguard_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "crowdguard_http_requests_in_flight";

    // Analysis metrics
    pub const ANALYSES_TOTAL: &str = "crowdguard_analyses_total";
    pub const ANALYSIS_DURATION_SECONDS: &str = "crowdguard_analysis_duration_seconds";
    pub const CROWD_COUNT: &str = "crowdguard_crowd_count";

    // Live feed metrics
    pub const FEEDS_OPENED_TOTAL: &str = "crowdguard_feeds_opened_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "crowdguard_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a finished upload analysis.
pub fn record_analysis(outcome: &str, stopped: &str, count: u32, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string()), ("stopped", stopped.to_string())];
    counter!(names::ANALYSES_TOTAL, &labels).increment(1);
    histogram!(names::ANALYSIS_DURATION_SECONDS).record(duration_secs);
    histogram!(names::CROWD_COUNT).record(count as f64);
}

/// Record a live feed being opened.
pub fn record_feed_opened(mode: &str) {
    counter!(names::FEEDS_OPENED_TOTAL, "mode" => mode.to_string()).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

struct PathPatterns {
    guard_id: Regex,
    gate: Regex,
    feed: Regex,
}

fn patterns() -> &'static PathPatterns {
    static PATTERNS: OnceLock<PathPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| PathPatterns {
        guard_id: Regex::new(r"^/api/guards/[^/]+$").expect("valid regex"),
        gate: Regex::new(r"^/api/gates/[^/]+/").expect("valid regex"),
        feed: Regex::new(r"^/api/video-feed/[^/]+$").expect("valid regex"),
    })
}

/// Sanitize path for metrics labels (gate names and ids are unbounded).
pub(crate) fn sanitize_path(path: &str) -> String {
    let p = patterns();
    let path = p.guard_id.replace(path, "/api/guards/:id");
    let path = p.gate.replace(&path, "/api/gates/:gate/");
    let path = p.feed.replace(&path, "/api/video-feed/:gate");
    path.into_owned()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/guards/3f2a9c0d1e8b4a7f9c6d5e4f3a2b1c0d"),
            "/api/guards/:id"
        );
        assert_eq!(
            sanitize_path("/api/gates/North%20Gate/settings"),
            "/api/gates/:gate/settings"
        );
        assert_eq!(sanitize_path("/api/video-feed/Gate-A"), "/api/video-feed/:gate");
        assert_eq!(sanitize_path("/api/guards"), "/api/guards");
    }
}
