//! Per-job orchestration: validate, segment remotely, place and render.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::Instrument;
use vseg_media::{compute_plan, file_size, move_file};
use vseg_models::{CompositeStrategy, CompositingPlan, JobId, JobResult};

use crate::asr::Transcriber;
use crate::backend::{SegmentationBackend, SegmentationOutcome, SegmentationRequest};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress_store::{JobReporter, ProgressStore};
use crate::toolkit::MediaToolkit;

/// One video to process.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: JobId,
    pub video_path: PathBuf,
    pub background_path: Option<PathBuf>,
    pub strategy: CompositeStrategy,
}

impl JobRequest {
    pub fn new(video_path: impl Into<PathBuf>) -> Self {
        Self {
            job_id: JobId::new(),
            video_path: video_path.into(),
            background_path: None,
            strategy: CompositeStrategy::default(),
        }
    }

    pub fn with_background(mut self, path: impl Into<PathBuf>, strategy: CompositeStrategy) -> Self {
        self.background_path = Some(path.into());
        self.strategy = strategy;
        self
    }

    /// Background handed to the remote service for server-side compositing.
    fn remote_background(&self) -> Option<&Path> {
        match self.strategy {
            CompositeStrategy::Server => self.background_path.as_deref(),
            CompositeStrategy::Local => None,
        }
    }

    /// Background composited locally after segmentation.
    fn local_background(&self) -> Option<&Path> {
        match self.strategy {
            CompositeStrategy::Local => self.background_path.as_deref(),
            CompositeStrategy::Server => None,
        }
    }
}

/// Runs jobs through the segmentation backend and the local renderer and
/// keeps their progress records current.
pub struct Orchestrator {
    config: Arc<WorkerConfig>,
    store: ProgressStore,
    backend: Arc<dyn SegmentationBackend>,
    transcriber: Arc<dyn Transcriber>,
    toolkit: Arc<dyn MediaToolkit>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<WorkerConfig>,
        store: ProgressStore,
        backend: Arc<dyn SegmentationBackend>,
        transcriber: Arc<dyn Transcriber>,
        toolkit: Arc<dyn MediaToolkit>,
    ) -> Self {
        Self {
            config,
            store,
            backend,
            transcriber,
            toolkit,
        }
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Run a job to a terminal state.
    ///
    /// The record is created if missing, ends `completed` with the result or
    /// `failed` with a short message. The job-level timeout covers every step.
    pub async fn run(&self, request: JobRequest, cancel: watch::Receiver<bool>) -> WorkerResult<JobResult> {
        let logger = JobLogger::new(&request.job_id, "segmentation");
        let span = logger.create_span();
        self.store.create(request.job_id.clone()).await;

        async {
            logger.log_start(&format!(
                "{} (background: {}, strategy: {})",
                request.video_path.display(),
                request.background_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "none".into()),
                request.strategy.as_str()
            ));

            let limit = self.config.job_timeout;
            let outcome = match tokio::time::timeout(limit, self.execute(&request, &logger, cancel)).await {
                Ok(result) => result,
                Err(_) => Err(WorkerError::JobTimeout(limit.as_secs())),
            };

            match &outcome {
                Ok(result) => {
                    self.store.complete(&request.job_id, result.clone()).await;
                    metrics::record_completed(&result.background_mode, logger.elapsed_secs());
                    logger.log_completion(&result.processed_video);
                }
                Err(e) => {
                    let retryable = e.is_retryable() && !e.is_permanent_failure();
                    if retryable {
                        self.store.fail_retryable(&request.job_id, &e.user_message()).await;
                    } else {
                        self.store.fail(&request.job_id, &e.user_message()).await;
                    }
                    metrics::record_failed(metrics::failure_kind(e), retryable);
                    logger.log_error(&e.to_string(), retryable);
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &JobRequest,
        logger: &JobLogger,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<JobResult> {
        let created_at = Utc::now();
        let key_suffix = request.job_id.key_suffix(created_at);
        let reporter = self.store.reporter(request.job_id.clone());

        step(&reporter, logger, 5, "Validating input").await;
        let original_size_bytes = self.validate(request).await?;

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("job_{}_", request.job_id))
            .tempdir_in(&self.config.work_dir)?;

        let transcript = match self.transcriber.transcribe(&request.video_path).await {
            Ok(segments) => segments,
            Err(e) => {
                logger.log_warning(&format!("transcription skipped: {e}"));
                Vec::new()
            }
        };

        let segmentation_request = SegmentationRequest {
            job_id: request.job_id.clone(),
            key_suffix: key_suffix.clone(),
            video_path: request.video_path.clone(),
            background_path: request.remote_background().map(Path::to_path_buf),
            output_path: scratch.path().join("segmented.mp4"),
        };
        let segmented = self
            .backend
            .segment(&segmentation_request, &reporter, cancel.clone())
            .await?;

        let (final_path, plan) = match request.local_background() {
            Some(background) => {
                let (path, plan) = self
                    .composite_locally(&segmented, background, scratch.path(), &reporter, logger, cancel)
                    .await?;
                (path, Some(plan))
            }
            None => (segmented.output_path.clone(), None),
        };

        let destination = self
            .config
            .output_dir
            .join(format!("processed_{key_suffix}.mp4"));
        move_file(&final_path, &destination).await?;
        let processed_size_bytes = file_size(&destination).await?;

        Ok(JobResult {
            job_id: request.job_id.clone(),
            original_file: request.video_path.display().to_string(),
            processed_video: destination.display().to_string(),
            background_mode: segmented.mode.wire_name().to_string(),
            background_url: segmented.background_url.clone(),
            segmentation_job_id: segmented.segmentation_job_id.clone(),
            plan,
            transcript,
            original_size_bytes,
            processed_size_bytes,
            processing_time_secs: logger.elapsed_secs(),
            created_at,
            completed_at: Utc::now(),
            service: self.backend.name().to_string(),
        })
    }

    /// Input checks and the duration guard. Returns the input size.
    async fn validate(&self, request: &JobRequest) -> WorkerResult<u64> {
        let meta = tokio::fs::metadata(&request.video_path)
            .await
            .map_err(|_| WorkerError::invalid_input(format!("video not found: {}", request.video_path.display())))?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(WorkerError::invalid_input("video file is empty"));
        }

        if let Some(background) = &request.background_path {
            if !tokio::fs::try_exists(background).await.unwrap_or(false) {
                return Err(WorkerError::invalid_input(format!(
                    "background image not found: {}",
                    background.display()
                )));
            }
        }

        let info = self.toolkit.probe(&request.video_path).await?;
        if info.duration > self.config.max_video_secs {
            return Err(WorkerError::VideoTooLong {
                duration: info.duration,
                limit: self.config.max_video_secs,
            });
        }
        Ok(meta.len())
    }

    async fn composite_locally(
        &self,
        segmented: &SegmentationOutcome,
        background: &Path,
        scratch: &Path,
        reporter: &JobReporter,
        logger: &JobLogger,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<(PathBuf, CompositingPlan)> {
        step(reporter, logger, 90, "Computing placement").await;
        let canvas = self.toolkit.image_dimensions(background).await?;
        let sample = self.toolkit.inspect_foreground(&segmented.output_path, scratch).await?;
        let plan = compute_plan(
            canvas,
            sample.dimensions,
            sample.bbox,
            sample.has_alpha,
            &self.config.geometry,
        )?;

        step(reporter, logger, 95, "Rendering composite").await;
        let output = scratch.join("composite.mp4");
        self.toolkit
            .composite(&plan, &segmented.output_path, background, &output, cancel)
            .await?;
        Ok((output, plan))
    }
}

async fn step(reporter: &JobReporter, logger: &JobLogger, progress: u8, description: &str) {
    logger.log_step(progress, description);
    reporter.step(progress, description).await;
}
