//! Object storage configuration.

use std::time::Duration;

use crate::error::{StorageError, StorageResult};
use crate::retry::{RetryPolicy, DEFAULT_BACKOFF_SECS, DEFAULT_TIMEOUT_SECS};
use crate::signer::{Credential, DEFAULT_SIGN_WINDOW_SECS};

/// Files above this size use the extended timeout budget (100 MiB).
pub const DEFAULT_LARGE_FILE_BYTES: u64 = 100 * 1024 * 1024;

/// Hard upper bound for a single-request transfer (5 GiB).
pub const MAX_OBJECT_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Configuration for the transfer manager.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub credential: Credential,
    pub bucket: String,
    pub region: String,
    /// Also try the global acceleration endpoint first
    pub accelerate: bool,
    /// URL scheme for storage requests
    pub scheme: String,
    pub sign_window_secs: i64,
    pub retry: RetryPolicy,
    pub large_file_threshold: u64,
    pub large_file_timeout: Duration,
    pub max_object_bytes: u64,
    /// Probe candidate domains (DNS + TCP) before transferring
    pub probe_domains: bool,
    pub probe_timeout: Duration,
    pub domain_cache_ttl: Duration,
    /// Explicit host list replacing the derived candidates
    pub domains_override: Option<Vec<String>>,
    /// Base used for public object URLs; defaults to the regional endpoint
    pub public_base_url: Option<String>,
}

impl StorageConfig {
    /// Create a config with production defaults.
    pub fn new(credential: Credential, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            credential,
            bucket: bucket.into(),
            region: region.into(),
            accelerate: false,
            scheme: "https".to_string(),
            sign_window_secs: DEFAULT_SIGN_WINDOW_SECS,
            retry: RetryPolicy::new("transfer"),
            large_file_threshold: DEFAULT_LARGE_FILE_BYTES,
            large_file_timeout: Duration::from_secs(600),
            max_object_bytes: MAX_OBJECT_BYTES,
            probe_domains: true,
            probe_timeout: Duration::from_secs(10),
            domain_cache_ttl: Duration::from_secs(300),
            domains_override: None,
            public_base_url: None,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let secret_id = std::env::var("TENCENT_SECRET_ID")
            .map_err(|_| StorageError::config_error("TENCENT_SECRET_ID not set"))?;
        let secret_key = std::env::var("TENCENT_SECRET_KEY")
            .map_err(|_| StorageError::config_error("TENCENT_SECRET_KEY not set"))?;
        let bucket = std::env::var("TENCENT_COS_BUCKET")
            .map_err(|_| StorageError::config_error("TENCENT_COS_BUCKET not set"))?;
        let region = std::env::var("TENCENT_REGION").unwrap_or_else(|_| "ap-beijing".to_string());

        let mut config = Self::new(Credential::new(secret_id, secret_key)?, bucket, region);

        config.accelerate = env_bool("TENCENT_COS_ACCELERATE").unwrap_or(false);
        if let Ok(scheme) = std::env::var("COS_SCHEME") {
            config.scheme = scheme;
        }
        config.sign_window_secs = env_parse("COS_SIGN_WINDOW_SECS").unwrap_or(DEFAULT_SIGN_WINDOW_SECS);
        let max_attempts: u32 = env_parse("COS_MAX_RETRIES").unwrap_or(DEFAULT_BACKOFF_SECS.len() as u32);
        config.retry = RetryPolicy::new("transfer")
            .with_max_attempts(max_attempts)
            .with_timeouts(DEFAULT_TIMEOUT_SECS.iter().map(|s| Duration::from_secs(*s)).collect());
        config.large_file_threshold = env_parse("COS_LARGE_FILE_BYTES").unwrap_or(DEFAULT_LARGE_FILE_BYTES);
        config.probe_domains = env_bool("COS_PROBE_DOMAINS").unwrap_or(true);
        config.domains_override = std::env::var("COS_DOMAINS").ok().map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });
        config.public_base_url = std::env::var("COS_PUBLIC_BASE_URL").ok();

        Ok(config)
    }

    /// Regional endpoint host of the bucket.
    pub fn regional_host(&self) -> String {
        format!("{}.cos.{}.myqcloud.com", self.bucket, self.region)
    }

    /// Default port implied by the scheme, used when probing.
    pub fn default_port(&self) -> u16 {
        if self.scheme.eq_ignore_ascii_case("http") {
            80
        } else {
            443
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::new(Credential::new("id", "key").unwrap(), "bucket-123", "ap-guangzhou");
        assert_eq!(config.regional_host(), "bucket-123.cos.ap-guangzhou.myqcloud.com");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.default_port(), 443);
        assert!(!config.accelerate);
        assert_eq!(config.large_file_threshold, 100 * 1024 * 1024);
    }
}
