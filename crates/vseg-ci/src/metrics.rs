//! Segmentation service metrics.

use metrics::counter;

pub mod names {
    /// Requests by operation and HTTP status.
    pub const REQUESTS_TOTAL: &str = "ci_requests_total";

    /// Status queries by observed job state.
    pub const POLL_QUERIES_TOTAL: &str = "ci_poll_queries_total";
}

pub fn record_request(operation: &str, status: u16) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_poll(state: &str) {
    counter!(names::POLL_QUERIES_TOTAL, "state" => state.to_string()).increment(1);
}
