//! Segmentation worker.
//!
//! Takes a local video (and optionally a background image) through object
//! storage and the remote segmentation service, then places and renders the
//! subject locally when asked to. Progress is tracked per job in a shared
//! [`ProgressStore`].

pub mod asr;
pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress_store;
pub mod toolkit;

pub use asr::{transcriber_from_config, DisabledTranscriber, SegmentFileTranscriber, Transcriber};
pub use backend::{backend_from_config, SegmentationBackend, SegmentationOutcome, SegmentationRequest, TencentCiBackend};
pub use config::{BackendKind, TranscriberKind, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{JobRequest, Orchestrator};
pub use progress_store::{JobReporter, ProgressStore};
pub use toolkit::{FfmpegToolkit, MediaToolkit};
