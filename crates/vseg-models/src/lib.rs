//! Shared data models for the segmentation and compositing worker.
//!
//! This crate provides Serde-serializable types for:
//! - Job identity and progress records
//! - Remote segmentation modes and job states
//! - Compositing geometry (dimensions, rectangles, plans)
//! - Transcript segments from the ASR collaborator

pub mod geometry;
pub mod job;
pub mod job_status;
pub mod result;
pub mod segmentation;
pub mod transcript;

// Re-export common types
pub use geometry::{Dimensions, PixelRect, CompositingPlan};
pub use job::{CompositeStrategy, JobId};
pub use job_status::{JobProgressRecord, ProcessingStatus};
pub use result::JobResult;
pub use segmentation::{QueueState, SegmentationMode, SegmentationState};
pub use transcript::TranscriptSegment;
