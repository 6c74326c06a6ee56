//! Job progress record for status polling.
//!
//! A record is created when a job is accepted and is the only state the
//! outside world observes about that job.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{JobId, JobResult};

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Job accepted, waiting for a worker slot
    #[default]
    Pending,
    /// Job is actively being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl ProcessingStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            ProcessingStatus::Pending => 0,
            ProcessingStatus::Processing => 1,
            ProcessingStatus::Completed | ProcessingStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the record moving forward.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable progress of a single job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobProgressRecord {
    /// Unique job identifier
    pub job_id: JobId,
    /// Current job status
    pub status: ProcessingStatus,
    /// Progress percentage (0-100)
    pub progress_percent: u8,
    /// Current processing step description
    pub step_description: String,
    /// Result payload, present once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    /// Short user-facing error message if the job failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether running the same job again may succeed
    #[serde(default)]
    pub retryable: bool,
    /// When the job was accepted
    pub created_at: DateTime<Utc>,
    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Sequence number for event ordering (monotonically increasing)
    pub event_seq: u64,
}

impl JobProgressRecord {
    /// Create a new pending record.
    pub fn new(job_id: JobId) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: ProcessingStatus::Pending,
            progress_percent: 0,
            step_description: "Queued".into(),
            result: None,
            error: None,
            retryable: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
            event_seq: 0,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    /// Move to processing and record the current step.
    ///
    /// Progress never decreases and terminal records are left untouched.
    /// Returns `false` when the update was rejected.
    pub fn advance(&mut self, progress: u8, step: impl Into<String>) -> bool {
        if !self.status.can_transition_to(ProcessingStatus::Processing) {
            return false;
        }
        self.status = ProcessingStatus::Processing;
        self.progress_percent = self.progress_percent.max(progress.min(100));
        self.step_description = step.into();
        self.touch();
        true
    }

    /// Mark job as completed with its result.
    pub fn complete(&mut self, result: JobResult) -> bool {
        if !self.status.can_transition_to(ProcessingStatus::Completed) {
            return false;
        }
        let now = Utc::now();
        self.status = ProcessingStatus::Completed;
        self.progress_percent = 100;
        self.step_description = "Complete".into();
        self.result = Some(result);
        self.completed_at = Some(now);
        self.touch();
        true
    }

    /// Mark job as failed with a short error message.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.status.can_transition_to(ProcessingStatus::Failed) {
            return false;
        }
        self.status = ProcessingStatus::Failed;
        self.error = Some(error.into());
        self.step_description = "Failed".into();
        self.completed_at = Some(Utc::now());
        self.touch();
        true
    }

    /// Mark job as failed with a transient cause, so a rerun may succeed.
    pub fn fail_retryable(&mut self, error: impl Into<String>) -> bool {
        if !self.fail(error) {
            return false;
        }
        self.retryable = true;
        true
    }
}
