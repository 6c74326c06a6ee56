//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vseg_media::GeometryConfig;
use vseg_models::CompositeStrategy;

use crate::error::{WorkerError, WorkerResult};

/// Remote segmentation services the worker can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    TencentCi,
}

impl FromStr for BackendKind {
    type Err = WorkerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tencent_ci" | "tencent" | "ci" => Ok(BackendKind::TencentCi),
            other => Err(WorkerError::config_error(format!("unknown segmentation backend '{other}'"))),
        }
    }
}

/// Where transcript segments come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranscriberKind {
    #[default]
    Disabled,
    /// JSON sidecar written by an external ASR service
    SegmentFile,
}

impl FromStr for TranscriberKind {
    type Err = WorkerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "disabled" | "none" => Ok(TranscriberKind::Disabled),
            "segment_file" | "sidecar" => Ok(TranscriberKind::SegmentFile),
            other => Err(WorkerError::config_error(format!("unknown ASR service '{other}'"))),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Wall-clock limit for one job
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Scratch space; each job gets its own directory below it
    pub work_dir: PathBuf,
    /// Where finished videos are kept
    pub output_dir: PathBuf,
    /// Longest accepted input video in seconds
    pub max_video_secs: f64,
    pub segmentation_backend: BackendKind,
    pub asr_service: TranscriberKind,
    /// Default compositing strategy when a background is supplied
    pub composite_strategy: CompositeStrategy,
    pub geometry: GeometryConfig,
    /// Prometheus listener, disabled when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(3600),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: PathBuf::from("/tmp/vseg"),
            output_dir: PathBuf::from("/tmp/vseg/output"),
            max_video_secs: 300.0,
            segmentation_backend: BackendKind::default(),
            asr_service: TranscriberKind::default(),
            composite_strategy: CompositeStrategy::default(),
            geometry: GeometryConfig::default(),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();
        let geometry = GeometryConfig {
            scale_ratio: env_parse("FG_SCALE_RATIO")?.unwrap_or(defaults.geometry.scale_ratio),
            top_margin: env_parse("FG_TOP_MARGIN")?.unwrap_or(defaults.geometry.top_margin),
            bottom_margin: env_parse("FG_BOTTOM_MARGIN")?.unwrap_or(defaults.geometry.bottom_margin),
            safe_margin_ratio: env_parse("FG_SAFE_MARGIN_RATIO")?.unwrap_or(defaults.geometry.safe_margin_ratio),
        };
        geometry
            .validate()
            .map_err(|e| WorkerError::config_error(e.to_string()))?;

        let work_dir = std::env::var("WORKER_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);
        let output_dir = std::env::var("WORKER_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| work_dir.join("output"));

        let config = Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")?.unwrap_or(defaults.max_concurrent_jobs),
            job_timeout: Duration::from_secs(env_parse("WORKER_JOB_TIMEOUT")?.unwrap_or(3600)),
            shutdown_timeout: Duration::from_secs(env_parse("WORKER_SHUTDOWN_TIMEOUT")?.unwrap_or(30)),
            work_dir,
            output_dir,
            max_video_secs: env_parse("WORKER_MAX_VIDEO_SECS")?.unwrap_or(defaults.max_video_secs),
            segmentation_backend: env_parse("SEGMENTATION_BACKEND")?.unwrap_or_default(),
            asr_service: env_parse("ASR_SERVICE")?.unwrap_or_default(),
            composite_strategy: std::env::var("COMPOSITE_STRATEGY")
                .map(|v| CompositeStrategy::parse(&v))
                .unwrap_or_default(),
            geometry,
            metrics_addr: env_parse("VSEG_METRICS_ADDR")?,
        };

        if config.max_concurrent_jobs == 0 {
            return Err(WorkerError::config_error("WORKER_MAX_JOBS must be at least 1"));
        }
        Ok(config)
    }
}

/// Parse an optional variable; a present but malformed value is an error.
fn env_parse<T>(name: &str) -> WorkerResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| WorkerError::config_error(format!("invalid {name}: {e}"))),
        _ => Ok(None),
    }
}
