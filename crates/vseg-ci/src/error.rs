//! Segmentation service error types.

use thiserror::Error;
use vseg_storage::{Retryable, StorageError};

pub type CiResult<T> = Result<T, CiError>;

/// Error code returned when the bucket has no media AI capability bound.
pub const CODE_CAPABILITY_NOT_BOUND: &str = "AIBucketUnBinded";

/// Operator guidance when automatic provisioning cannot fix a missing capability.
pub const CAPABILITY_GUIDANCE: &str = "Video segmentation is not enabled for this bucket. \
Enable AI content recognition for the bucket in the cloud console and create an \
AIProcess queue, then retry.";

#[derive(Debug, Error)]
pub enum CiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Segmentation capability not enabled: {0}")]
    CapabilityNotEnabled(String),

    #[error("Service returned {status} ({code}): {message}")]
    Api { status: u16, code: String, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] StorageError),
}

impl CiError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Whether a single call is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            CiError::Timeout(_) | CiError::Network(_) => true,
            CiError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl Retryable for CiError {
    fn is_retryable(&self) -> bool {
        CiError::is_retryable(self)
    }
}
