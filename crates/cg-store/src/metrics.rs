//! Store metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Store requests by backend, operation and status.
    pub const REQUESTS_TOTAL: &str = "crowdguard_store_requests_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "crowdguard_store_retries_total";

    /// Request latency in seconds by backend and operation.
    pub const LATENCY_SECONDS: &str = "crowdguard_store_latency_seconds";
}

/// Record a completed store request.
pub fn record_request(backend: &'static str, operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "backend" => backend,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "backend" => backend,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}
