//! Client for the remote video segmentation job service.
//!
//! Covers queue discovery (with activation and capability provisioning),
//! job submission and status polling. Every call is signed with the same
//! scheme as object storage requests.

pub mod client;
pub mod error;
pub mod metrics;
pub mod poll;
pub mod queue;
pub mod types;

pub use client::{CiConfig, SegmentationJobClient};
pub use error::{CiError, CiResult, CAPABILITY_GUIDANCE};
pub use poll::{PollOutcome, SegmentationJob, StatusReport};
pub use queue::{choose_queue, QueuePick};
pub use types::QueueInfo;
