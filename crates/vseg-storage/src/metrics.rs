//! Transfer metrics collection.
//!
//! Provides standardized metrics for monitoring object transfers:
//! - Attempt counters by direction and outcome
//! - Retry counters
//! - Transferred bytes and latency

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Transfer attempts by op (upload/download) and outcome.
    pub const ATTEMPTS_TOTAL: &str = "transfer_attempts_total";

    /// Retry rounds by op.
    pub const RETRIES_TOTAL: &str = "transfer_retries_total";

    /// Bytes moved by successful transfers.
    pub const BYTES_TOTAL: &str = "transfer_bytes_total";

    /// Successful transfer latency in seconds.
    pub const LATENCY_SECONDS: &str = "transfer_latency_seconds";
}

/// Record the outcome of a single attempt against one domain.
pub fn record_attempt(op: &str, outcome: &str) {
    counter!(
        names::ATTEMPTS_TOTAL,
        "op" => op.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a retry round (all domains failed once more).
pub fn record_retry(op: &str) {
    counter!(names::RETRIES_TOTAL, "op" => op.to_string()).increment(1);
}

/// Record a completed transfer.
pub fn record_success(op: &str, bytes: u64, latency_ms: f64) {
    counter!(names::BYTES_TOTAL, "op" => op.to_string()).increment(bytes);
    histogram!(names::LATENCY_SECONDS, "op" => op.to_string()).record(latency_ms / 1000.0);
}
