//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Access denied for {0}: check credentials and bucket permissions")]
    PermissionDenied(String),

    #[error("Object or bucket not found: {0}")]
    NotFound(String),

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Unexpected HTTP status {status} from {host}: {body}")]
    UnexpectedStatus { host: String, status: u16, body: String },

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("All {attempts} transfer attempts failed, last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn permission_denied(key: impl Into<String>) -> Self {
        Self::PermissionDenied(key.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Map a reqwest failure onto the taxonomy.
    pub fn from_reqwest(host: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(host.to_string())
        } else {
            Self::Network(format!("{}: {}", host, err))
        }
    }

    /// Check if the failure is worth another attempt on this or another domain.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::UnexpectedStatus { .. } => true,
            Self::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_not_retryable() {
        assert!(!StorageError::permission_denied("k").is_retryable());
        assert!(!StorageError::not_found("k").is_retryable());
        assert!(!StorageError::config_error("x").is_retryable());
        assert!(!StorageError::FileTooLarge { size: 2, limit: 1 }.is_retryable());
    }

    #[test]
    fn test_transient_errors_retryable() {
        assert!(StorageError::Timeout("h".into()).is_retryable());
        assert!(StorageError::network("reset").is_retryable());
        assert!(StorageError::UnexpectedStatus {
            host: "h".into(),
            status: 503,
            body: String::new()
        }
        .is_retryable());
    }
}
