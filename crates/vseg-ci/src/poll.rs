//! Job status polling.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Method;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vseg_models::{SegmentationMode, SegmentationState};
use vseg_storage::FailureTracker;

use crate::client::SegmentationJobClient;
use crate::error::{CiError, CiResult};
use crate::metrics::record_poll;
use crate::types::{decode, JobResponse};

/// A remote segmentation job as tracked locally.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationJob {
    /// Job ID assigned by the service
    pub job_id: String,
    pub input_key: String,
    pub output_key: String,
    pub mode: SegmentationMode,
    pub queue_id: Option<String>,
    pub state: SegmentationState,
    pub submitted_at: DateTime<Utc>,
    /// Last message reported by the service
    pub message: Option<String>,
}

impl SegmentationJob {
    pub fn submitted(
        job_id: impl Into<String>,
        input_key: impl Into<String>,
        output_key: impl Into<String>,
        mode: SegmentationMode,
        queue_id: Option<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            input_key: input_key.into(),
            output_key: output_key.into(),
            mode,
            queue_id,
            state: SegmentationState::Submitted,
            submitted_at: Utc::now(),
            message: None,
        }
    }

    /// Apply an observed state; backwards or unknown observations are ignored.
    pub fn advance(&mut self, next: SegmentationState) -> bool {
        if self.state.can_transition_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

/// Final result of polling a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    /// The service reported failure
    Failed { message: String },
    /// The budget ran out; the remote state is unknown, not failed
    Timeout { last_state: SegmentationState },
    /// The caller cancelled
    Cancelled,
}

/// One status observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub state: SegmentationState,
    /// State string as sent by the service
    pub raw_state: String,
    pub message: Option<String>,
}

impl SegmentationJobClient {
    /// Query a job's state once.
    pub async fn query_status(&self, job_id: &str) -> CiResult<StatusReport> {
        let path = format!("/jobs/{}", job_id);
        let body = self.call_once("query_job", Method::GET, &path, None, 0).await?;
        let parsed: JobResponse = decode(&body)?;
        let detail = parsed
            .detail()
            .ok_or_else(|| CiError::invalid_response("status response has no JobsDetail"))?;

        let raw_state = detail.state().unwrap_or_default();
        Ok(StatusReport {
            state: SegmentationState::from_wire(&raw_state),
            raw_state,
            message: detail.message(),
        })
    }

    /// Poll until the job succeeds, fails, the budget runs out or the caller
    /// cancels.
    ///
    /// Failed queries and unrecognized states are retried on a shorter
    /// interval; none of them ends the loop early.
    pub async fn poll(
        &self,
        job: &mut SegmentationJob,
        budget: Duration,
        cancel: &mut watch::Receiver<bool>,
    ) -> PollOutcome {
        let deadline = Instant::now() + budget;
        let job_id = job.job_id.clone();
        let mut failures = FailureTracker::new(3);
        let mut queries = 0u32;
        // Once the sender is gone nobody can cancel any more.
        let mut cancel_open = true;

        loop {
            if *cancel.borrow() {
                info!(ci_job_id = %job_id, "Polling cancelled");
                return PollOutcome::Cancelled;
            }

            queries += 1;
            // The budget and cancellation also cut a slow query short.
            let query = self.query_status(&job_id);
            tokio::pin!(query);
            let result = loop {
                tokio::select! {
                    result = &mut query => break result,
                    _ = tokio::time::sleep_until(deadline) => {
                        return budget_exhausted(job, queries);
                    }
                    changed = cancel.changed(), if cancel_open => {
                        if changed.is_err() {
                            cancel_open = false;
                        } else if *cancel.borrow() {
                            info!(ci_job_id = %job_id, "Polling cancelled during status query");
                            return PollOutcome::Cancelled;
                        }
                    }
                }
            };

            let wait = match result {
                Ok(report) => {
                    failures.record_success();
                    record_poll(report.state.as_str());
                    match report.state {
                        SegmentationState::Success => {
                            job.advance(SegmentationState::Success);
                            info!(ci_job_id = %job_id, queries, "Segmentation job succeeded");
                            return PollOutcome::Success;
                        }
                        SegmentationState::Failed => {
                            job.advance(SegmentationState::Failed);
                            let message = report
                                .message
                                .unwrap_or_else(|| "segmentation job failed without a message".to_string());
                            job.message = Some(message.clone());
                            warn!(ci_job_id = %job_id, message = %message, "Segmentation job failed");
                            return PollOutcome::Failed { message };
                        }
                        SegmentationState::Unknown => {
                            warn!(ci_job_id = %job_id, state = %report.raw_state, "Unrecognized job state");
                            self.config.poll_retry_interval
                        }
                        state => {
                            if job.advance(state) {
                                debug!(ci_job_id = %job_id, state = %state, "Job state changed");
                            }
                            job.message = report.message;
                            self.config.poll_interval
                        }
                    }
                }
                Err(e) => {
                    if failures.record_failure() {
                        warn!(ci_job_id = %job_id, "Status query failed: {}", e);
                    }
                    self.config.poll_retry_interval
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return budget_exhausted(job, queries);
            }

            let sleep_for = wait.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                changed = cancel.changed(), if cancel_open => {
                    if changed.is_err() {
                        cancel_open = false;
                        tokio::time::sleep(sleep_for).await;
                    }
                }
            }
        }
    }
}

fn budget_exhausted(job: &SegmentationJob, queries: u32) -> PollOutcome {
    warn!(
        ci_job_id = %job.job_id,
        queries,
        last_state = %job.state,
        "Polling budget exhausted"
    );
    PollOutcome::Timeout { last_state: job.state }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_advance_is_forward_only() {
        let mut job = SegmentationJob::submitted("j1", "in", "out", SegmentationMode::Foreground, None);
        assert!(job.advance(SegmentationState::Running));
        assert!(!job.advance(SegmentationState::Submitted));
        assert!(!job.advance(SegmentationState::Unknown));
        assert!(job.advance(SegmentationState::Success));
        assert!(!job.advance(SegmentationState::Failed));
        assert_eq!(job.state, SegmentationState::Success);
    }
}
