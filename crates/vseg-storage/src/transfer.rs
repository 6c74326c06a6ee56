//! Multi-domain upload and download with retries.
//!
//! Each round walks every usable domain once; a round that fails everywhere
//! sleeps on the backoff schedule before the next. Permission and missing
//! bucket/object errors abort immediately since no domain can fix them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, HOST};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::domains::{DomainCandidate, DomainSelector};
use crate::error::{StorageError, StorageResult};
use crate::metrics::{record_attempt, record_retry, record_success};
use crate::signer::{canonical_uri, Clock, RequestSigner};

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "upload",
            TransferDirection::Download => "download",
        }
    }

    fn method(&self) -> &'static str {
        match self {
            TransferDirection::Upload => "PUT",
            TransferDirection::Download => "GET",
        }
    }
}

/// One file to move between local disk and the bucket.
#[derive(Debug, Clone)]
pub struct TransferTask {
    pub local_path: PathBuf,
    pub remote_key: String,
    pub content_type: &'static str,
    /// Known size for uploads, `0` for downloads
    pub size_bytes: u64,
}

/// Summary of a successful transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub remote_key: String,
    /// Domain that served the successful attempt
    pub host: String,
    pub bytes: u64,
    /// Attempts made across all domains, including the successful one
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// MIME type for a local file based on its extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "webm" => "video/webm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn http_date() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Uploads and downloads objects across the candidate domains.
#[derive(Debug, Clone)]
pub struct TransferManager {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: StorageConfig,
    signer: RequestSigner,
    http: Client,
    domains: DomainSelector,
}

impl TransferManager {
    /// Create a transfer manager from configuration.
    pub fn new(config: StorageConfig) -> StorageResult<Self> {
        let signer = RequestSigner::new(config.credential.clone()).with_window(config.sign_window_secs);
        Self::with_signer(config, signer)
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(StorageConfig::from_env()?)
    }

    /// Create with a custom clock (tests, replay tooling).
    pub fn with_clock(config: StorageConfig, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let signer = RequestSigner::new(config.credential.clone())
            .with_window(config.sign_window_secs)
            .with_clock(clock);
        Self::with_signer(config, signer)
    }

    fn with_signer(config: StorageConfig, signer: RequestSigner) -> StorageResult<Self> {
        let http = Client::builder()
            .connect_timeout(config.probe_timeout)
            .user_agent(concat!("vseg-storage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::config_error(format!("Failed to build HTTP client: {}", e)))?;

        let domains = DomainSelector::new(&config);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                signer,
                http,
                domains,
            }),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    pub fn signer(&self) -> &RequestSigner {
        &self.inner.signer
    }

    /// Public URL of an object on the regional endpoint.
    pub fn object_url(&self, key: &str) -> String {
        let base = match &self.inner.config.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.inner.config.regional_host()),
        };
        format!("{}{}", base, canonical_uri(key))
    }

    /// Forget cached domain probe results.
    pub async fn invalidate_domains(&self) {
        self.inner.domains.invalidate().await;
    }

    /// Upload a local file to `object_key`.
    pub async fn upload(&self, local_path: impl AsRef<Path>, object_key: &str) -> StorageResult<TransferReceipt> {
        let local_path = local_path.as_ref();
        let metadata = tokio::fs::metadata(local_path).await?;
        let size = metadata.len();
        if size > self.inner.config.max_object_bytes {
            return Err(StorageError::FileTooLarge {
                size,
                limit: self.inner.config.max_object_bytes,
            });
        }
        if object_key.trim_matches('/').is_empty() {
            return Err(StorageError::InvalidKey(object_key.to_string()));
        }

        let task = TransferTask {
            local_path: local_path.to_path_buf(),
            remote_key: object_key.trim_start_matches('/').to_string(),
            content_type: content_type_for(local_path),
            size_bytes: size,
        };
        self.run(TransferDirection::Upload, &task).await
    }

    /// Download `object_key` into `local_path`, replacing it atomically.
    pub async fn download(&self, object_key: &str, local_path: impl AsRef<Path>) -> StorageResult<TransferReceipt> {
        let local_path = local_path.as_ref();
        if object_key.trim_matches('/').is_empty() {
            return Err(StorageError::InvalidKey(object_key.to_string()));
        }
        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let task = TransferTask {
            local_path: local_path.to_path_buf(),
            remote_key: object_key.trim_start_matches('/').to_string(),
            content_type: content_type_for(local_path),
            size_bytes: 0,
        };
        self.run(TransferDirection::Download, &task).await
    }

    fn attempt_timeout(&self, round: u32, size_bytes: u64) -> Duration {
        let config = &self.inner.config;
        let timeout = config.retry.timeout_for(round);
        if size_bytes > config.large_file_threshold {
            timeout.max(config.large_file_timeout)
        } else {
            timeout
        }
    }

    async fn run(&self, direction: TransferDirection, task: &TransferTask) -> StorageResult<TransferReceipt> {
        let op = direction.as_str();
        let domains = self.inner.domains.usable().await;
        let policy = &self.inner.config.retry;
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut last_error: Option<StorageError> = None;

        debug!(
            op,
            key = %task.remote_key,
            domains = domains.len(),
            size_bytes = task.size_bytes,
            "Starting transfer"
        );

        for round in 0..policy.max_attempts {
            let timeout = self.attempt_timeout(round, task.size_bytes);

            for domain in &domains {
                attempts += 1;
                let result = match direction {
                    TransferDirection::Upload => self.upload_once(task, domain, timeout).await,
                    TransferDirection::Download => self.download_once(task, domain, timeout).await,
                };

                match result {
                    Ok(bytes) => {
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        record_attempt(op, "success");
                        record_success(op, bytes, elapsed_ms as f64);
                        info!(
                            op,
                            key = %task.remote_key,
                            domain = %domain.hostname,
                            attempts,
                            bytes,
                            elapsed_ms,
                            "Transfer succeeded"
                        );
                        return Ok(TransferReceipt {
                            remote_key: task.remote_key.clone(),
                            host: domain.hostname.clone(),
                            bytes,
                            attempts,
                            elapsed_ms,
                        });
                    }
                    Err(e) if !e.is_retryable() => {
                        record_attempt(op, "fatal");
                        error!(
                            op,
                            key = %task.remote_key,
                            domain = %domain.hostname,
                            "Transfer aborted: {}",
                            e
                        );
                        return Err(e);
                    }
                    Err(e) => {
                        record_attempt(op, "retryable");
                        warn!(
                            op,
                            key = %task.remote_key,
                            domain = %domain.hostname,
                            attempt = round + 1,
                            timeout_secs = timeout.as_secs_f64(),
                            "Transfer attempt failed: {}",
                            e
                        );
                        last_error = Some(e);
                    }
                }
            }

            if round + 1 < policy.max_attempts {
                let delay = policy.backoff_for(round);
                record_retry(op);
                debug!(op, round = round + 1, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
            }
        }

        // A full exhaustion often means cached probe results are stale.
        self.inner.domains.invalidate().await;

        Err(StorageError::RetriesExhausted {
            attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no usable domains".to_string()),
        })
    }

    fn signed_request(
        &self,
        direction: TransferDirection,
        task: &TransferTask,
        host: &str,
        timeout: Duration,
    ) -> StorageResult<reqwest::RequestBuilder> {
        let uri = canonical_uri(&task.remote_key);
        let url = format!("{}://{}{}", self.inner.config.scheme, host, uri);
        let authorization = self.inner.signer.authorization(direction.method(), &uri, host)?;

        let builder = match direction {
            TransferDirection::Upload => self.inner.http.put(&url),
            TransferDirection::Download => self.inner.http.get(&url),
        };
        Ok(builder
            .timeout(timeout)
            .header(HOST, host)
            .header(DATE, http_date())
            .header(AUTHORIZATION, authorization))
    }

    async fn upload_once(&self, task: &TransferTask, domain: &DomainCandidate, timeout: Duration) -> StorageResult<u64> {
        let host = domain.hostname.as_str();
        let file = tokio::fs::File::open(&task.local_path).await?;

        let response = self
            .signed_request(TransferDirection::Upload, task, host, timeout)?
            .header(CONTENT_TYPE, task.content_type)
            .header(CONTENT_LENGTH, task.size_bytes)
            .body(reqwest::Body::from(file))
            .send()
            .await
            .map_err(|e| StorageError::from_reqwest(host, e))?;

        check_status(response, host, &task.remote_key).await?;
        Ok(task.size_bytes)
    }

    async fn download_once(&self, task: &TransferTask, domain: &DomainCandidate, timeout: Duration) -> StorageResult<u64> {
        let host = domain.hostname.as_str();
        let response = self
            .signed_request(TransferDirection::Download, task, host, timeout)?
            .send()
            .await
            .map_err(|e| StorageError::from_reqwest(host, e))?;

        let response = check_status(response, host, &task.remote_key).await?;

        let partial = partial_path(&task.local_path);
        let result = match write_body(response, &partial, host).await {
            Ok(bytes) => tokio::fs::rename(&partial, &task.local_path)
                .await
                .map(|()| bytes)
                .map_err(StorageError::from),
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        result
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    target.with_file_name(format!(".{}.{}.part", name, uuid::Uuid::new_v4().simple()))
}

async fn write_body(mut response: reqwest::Response, path: &Path, host: &str) -> StorageResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| StorageError::from_reqwest(host, e))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

async fn check_status(response: reqwest::Response, host: &str, key: &str) -> StorageResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::FORBIDDEN => Err(StorageError::permission_denied(key)),
        StatusCode::NOT_FOUND => Err(StorageError::not_found(key)),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::UnexpectedStatus {
                host: host.to_string(),
                status: status.as_u16(),
                body: body.chars().take(512).collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Credential;

    fn manager() -> TransferManager {
        let config = StorageConfig::new(Credential::new("id", "key").unwrap(), "bkt-1", "ap-shanghai");
        TransferManager::new(config).unwrap()
    }

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(content_type_for(Path::new("a/b.MP4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(content_type_for(Path::new("clip.mkv")), "video/x-matroska");
        assert_eq!(content_type_for(Path::new("bg.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_object_url_uses_regional_host() {
        assert_eq!(
            manager().object_url("backgrounds/bg 1.png"),
            "https://bkt-1.cos.ap-shanghai.myqcloud.com/backgrounds/bg%201.png"
        );
    }

    #[test]
    fn test_large_files_get_extended_timeout() {
        let m = manager();
        assert_eq!(m.attempt_timeout(0, 1024), Duration::from_secs(30));
        assert_eq!(m.attempt_timeout(0, 200 * 1024 * 1024), Duration::from_secs(600));
        assert_eq!(m.attempt_timeout(4, 1024), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_path_stays_in_directory() {
        let partial = partial_path(Path::new("/tmp/out/video.mp4"));
        assert_eq!(partial.parent(), Some(Path::new("/tmp/out")));
        assert!(partial.to_string_lossy().ends_with(".part"));
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.mp4");
        tokio::fs::write(&path, vec![0u8; 16]).await.unwrap();

        let mut config = StorageConfig::new(Credential::new("id", "key").unwrap(), "b", "r");
        config.max_object_bytes = 8;
        let m = TransferManager::new(config).unwrap();
        let err = m.upload(&path, "input/v.mp4").await.unwrap_err();
        assert!(matches!(err, StorageError::FileTooLarge { size: 16, limit: 8 }));
    }
}
