//! Result payload attached to a completed job.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{CompositingPlan, JobId, TranscriptSegment};

/// Outcome of a successfully processed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub job_id: JobId,
    /// Path of the uploaded source video
    pub original_file: String,
    /// Path of the final local video
    pub processed_video: String,
    /// Remote mode used: "Foreground" or "Combination"
    pub background_mode: String,
    /// Public URL of the uploaded background, when one was used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
    /// Job ID assigned by the segmentation service
    pub segmentation_job_id: String,
    /// Local placement, when compositing ran locally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<CompositingPlan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<TranscriptSegment>,
    pub original_size_bytes: u64,
    pub processed_size_bytes: u64,
    pub processing_time_secs: f64,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Name of the segmentation backend
    pub service: String,
}
