//! Worker error types.

use thiserror::Error;
use vseg_ci::CiError;
use vseg_media::MediaError;
use vseg_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Video is {duration:.1}s long, limit is {limit:.0}s")]
    VideoTooLong { duration: f64, limit: f64 },

    #[error("Segmentation failed: {0}")]
    SegmentationFailed(String),

    #[error("Timed out waiting for segmentation, last state {last_state}")]
    SegmentationTimeout { last_state: String },

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job exceeded {0}s time limit")]
    JobTimeout(u64),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Segmentation service error: {0}")]
    Ci(#[from] CiError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Short message for the job record. Diagnostic detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::InvalidInput(msg) => format!("invalid input: {msg}"),
            WorkerError::VideoTooLong { limit, .. } => {
                format!("video is longer than the {limit:.0} second limit")
            }
            WorkerError::SegmentationFailed(msg) if msg.is_empty() => "segmentation failed".to_string(),
            WorkerError::SegmentationFailed(msg) => format!("segmentation failed: {msg}"),
            WorkerError::SegmentationTimeout { .. } => {
                "timed out waiting for segmentation (remote state unknown)".to_string()
            }
            WorkerError::Cancelled => "job cancelled".to_string(),
            WorkerError::JobTimeout(secs) => format!("job exceeded the {secs} second time limit"),
            WorkerError::Storage(StorageError::PermissionDenied(_)) => {
                "storage access denied, check credentials and bucket permissions".to_string()
            }
            WorkerError::Storage(StorageError::NotFound(_)) => "storage object not found".to_string(),
            WorkerError::Storage(StorageError::FileTooLarge { .. }) => "file too large to upload".to_string(),
            WorkerError::Storage(StorageError::ConfigError(_)) | WorkerError::ConfigError(_) => {
                "service is misconfigured".to_string()
            }
            WorkerError::Storage(_) => "file transfer failed".to_string(),
            WorkerError::Ci(CiError::CapabilityNotEnabled(msg)) => msg.clone(),
            WorkerError::Ci(CiError::Config(_)) => "service is misconfigured".to_string(),
            WorkerError::Ci(_) => "segmentation service request failed".to_string(),
            WorkerError::Media(MediaError::InvalidVideo(_)) => "input is not a readable video".to_string(),
            WorkerError::Media(_) => "video processing failed".to_string(),
            WorkerError::Transcription(_) => "transcription failed".to_string(),
            WorkerError::Io(_) => "internal file error".to_string(),
        }
    }

    /// Transient failures: rerunning the same job may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::Ci(e) => e.is_retryable(),
            WorkerError::SegmentationTimeout { .. } | WorkerError::Io(_) => true,
            _ => false,
        }
    }

    /// Failures where running the same job again cannot help.
    pub fn is_permanent_failure(&self) -> bool {
        matches!(
            self,
            WorkerError::ConfigError(_)
                | WorkerError::InvalidInput(_)
                | WorkerError::VideoTooLong { .. }
                | WorkerError::SegmentationFailed(_)
                | WorkerError::Storage(StorageError::PermissionDenied(_))
                | WorkerError::Storage(StorageError::ConfigError(_))
                | WorkerError::Ci(CiError::CapabilityNotEnabled(_))
                | WorkerError::Ci(CiError::Config(_))
        )
    }
}
