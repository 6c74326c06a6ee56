//! Job-level metrics and the optional Prometheus listener.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "vseg_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vseg_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "vseg_job_duration_seconds";
    pub const JOBS_IN_FLIGHT: &str = "vseg_jobs_in_flight";
}

/// Serve `/metrics` on `addr`.
pub fn install_exporter(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {e}")))
}

pub fn record_completed(mode: &str, duration_secs: f64) {
    let labels = [("mode", mode.to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_failed(kind: &str, retryable: bool) {
    counter!(
        names::JOBS_FAILED_TOTAL,
        "kind" => kind.to_string(),
        "retryable" => retryable.to_string()
    )
    .increment(1);
}

pub fn set_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

/// Low-cardinality label for a failure.
pub fn failure_kind(err: &WorkerError) -> &'static str {
    match err {
        WorkerError::InvalidInput(_) | WorkerError::VideoTooLong { .. } => "input",
        WorkerError::SegmentationFailed(_) => "segmentation_failed",
        WorkerError::SegmentationTimeout { .. } => "segmentation_timeout",
        WorkerError::Cancelled => "cancelled",
        WorkerError::JobTimeout(_) => "job_timeout",
        WorkerError::Storage(_) => "storage",
        WorkerError::Ci(_) => "ci",
        WorkerError::Media(_) => "media",
        WorkerError::Transcription(_) => "transcription",
        WorkerError::ConfigError(_) => "config",
        WorkerError::Io(_) => "internal",
    }
}
