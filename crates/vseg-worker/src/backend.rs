//! Remote segmentation backends.
//!
//! A backend takes a local video through the remote service and leaves a
//! normalized result on local disk. The worker picks one implementation at
//! startup from configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use vseg_ci::{PollOutcome, SegmentationJobClient};
use vseg_models::{JobId, SegmentationMode};
use vseg_storage::TransferManager;

use crate::config::BackendKind;
use crate::error::{WorkerError, WorkerResult};
use crate::progress_store::JobReporter;
use crate::toolkit::MediaToolkit;

/// Progress reported while waiting on the remote job.
const POLL_PROGRESS_START: u8 = 40;
const POLL_PROGRESS_END: u8 = 78;
const POLL_PROGRESS_STEP: u8 = 4;

/// Input for one remote segmentation run.
#[derive(Debug, Clone)]
pub struct SegmentationRequest {
    pub job_id: JobId,
    /// Shared by every object key and output file of the job
    pub key_suffix: String,
    pub video_path: PathBuf,
    /// Background image for server-side compositing
    pub background_path: Option<PathBuf>,
    /// Where the normalized result is written
    pub output_path: PathBuf,
}

/// What the remote run produced.
#[derive(Debug, Clone)]
pub struct SegmentationOutcome {
    pub segmentation_job_id: String,
    pub mode: SegmentationMode,
    pub input_key: String,
    pub output_key: String,
    pub background_url: Option<String>,
    pub output_path: PathBuf,
}

#[async_trait]
pub trait SegmentationBackend: Send + Sync {
    /// Service name recorded in job results.
    fn name(&self) -> &'static str;

    async fn segment(
        &self,
        request: &SegmentationRequest,
        reporter: &JobReporter,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<SegmentationOutcome>;
}

/// Object storage plus the CI segmentation API.
pub struct TencentCiBackend {
    transfer: TransferManager,
    client: SegmentationJobClient,
    toolkit: Arc<dyn MediaToolkit>,
}

impl TencentCiBackend {
    pub fn new(transfer: TransferManager, client: SegmentationJobClient, toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self {
            transfer,
            client,
            toolkit,
        }
    }

    pub fn from_env(toolkit: Arc<dyn MediaToolkit>) -> WorkerResult<Self> {
        Ok(Self::new(TransferManager::from_env()?, SegmentationJobClient::from_env()?, toolkit))
    }

    async fn upload_background(&self, path: &Path, reporter: &JobReporter) -> WorkerResult<String> {
        let key = background_key(path, chrono::Utc::now().timestamp());
        reporter.step(20, "Uploading background image").await;
        self.transfer.upload(path, &key).await?;
        Ok(self.transfer.object_url(&key))
    }
}

#[async_trait]
impl SegmentationBackend for TencentCiBackend {
    fn name(&self) -> &'static str {
        "tencent-ci"
    }

    async fn segment(
        &self,
        request: &SegmentationRequest,
        reporter: &JobReporter,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<SegmentationOutcome> {
        let suffix = &request.key_suffix;
        let input_key = format!("input/video_{suffix}.mp4");
        let output_key = format!("output/processed_{suffix}.mp4");

        reporter.step(10, "Uploading video").await;
        let receipt = self.transfer.upload(&request.video_path, &input_key).await?;
        info!(
            job_id = %request.job_id,
            key = %receipt.remote_key,
            bytes = receipt.bytes,
            attempts = receipt.attempts,
            "Video uploaded"
        );

        let background_url = match &request.background_path {
            Some(path) => Some(self.upload_background(path, reporter).await?),
            None => None,
        };
        reporter.step(25, "Upload complete").await;

        let mode = match &background_url {
            Some(url) => SegmentationMode::Combination {
                background_url: url.clone(),
            },
            None => SegmentationMode::Foreground,
        };

        reporter.step(30, "Submitting segmentation job").await;
        let mut job = self.client.submit(&input_key, &output_key, &mode).await?;

        reporter.step(POLL_PROGRESS_START, "Segmentation running").await;
        let ticker = TaskGuard::spawn(tick_progress(reporter.clone(), self.client.config().poll_interval));
        let mut cancel_rx = cancel.clone();
        let outcome = self
            .client
            .poll(&mut job, self.client.config().poll_timeout, &mut cancel_rx)
            .await;
        ticker.stop().await;

        match outcome {
            PollOutcome::Success => {}
            PollOutcome::Failed { message } => return Err(WorkerError::SegmentationFailed(message)),
            PollOutcome::Timeout { last_state } => {
                return Err(WorkerError::SegmentationTimeout {
                    last_state: last_state.as_str().to_string(),
                })
            }
            PollOutcome::Cancelled => return Err(WorkerError::Cancelled),
        }
        reporter.step(80, "Segmentation finished").await;

        reporter.step(85, "Downloading result").await;
        self.transfer.download(&output_key, &request.output_path).await?;
        self.toolkit.normalize(&request.output_path, cancel).await?;

        Ok(SegmentationOutcome {
            segmentation_job_id: job.job_id,
            mode,
            input_key,
            output_key,
            background_url,
            output_path: request.output_path.clone(),
        })
    }
}

/// Background task that is aborted when the guard goes away, including when
/// the owning future is dropped mid-await.
struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    fn spawn<F>(task: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(task))
    }

    /// Abort and wait until the task is gone.
    async fn stop(mut self) {
        self.0.abort();
        let _ = (&mut self.0).await;
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Nudge progress through the polling band while the remote job runs.
async fn tick_progress(reporter: JobReporter, every: Duration) {
    let mut progress = POLL_PROGRESS_START;
    while progress < POLL_PROGRESS_END {
        tokio::time::sleep(every).await;
        progress = (progress + POLL_PROGRESS_STEP).min(POLL_PROGRESS_END);
        reporter.step(progress, "Segmentation running").await;
    }
}

/// `backgrounds/bg_{ts}{ext}`, keeping the image's own extension.
fn background_key(path: &Path, timestamp: i64) -> String {
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_else(|| ".png".to_string());
    format!("backgrounds/bg_{timestamp}{ext}")
}

/// Build the configured backend.
pub fn backend_from_config(
    kind: BackendKind,
    toolkit: Arc<dyn MediaToolkit>,
) -> WorkerResult<Arc<dyn SegmentationBackend>> {
    match kind {
        BackendKind::TencentCi => Ok(Arc::new(TencentCiBackend::from_env(toolkit)?)),
    }
}
