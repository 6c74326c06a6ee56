//! FFmpeg wrapper and compositing geometry for the segmentation worker.
//!
//! - [`geometry`] and [`bbox`] are pure and decide where the subject goes.
//! - [`compose`] and [`normalize`] drive the FFmpeg CLI.
//! - [`probe`] and [`frame`] read media metadata and sample frames.

pub mod bbox;
pub mod command;
pub mod compose;
pub mod error;
pub mod frame;
pub mod fs_utils;
pub mod geometry;
pub mod normalize;
pub mod probe;
pub mod progress;

pub use bbox::{detect_bounding_box, BboxOptions};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::{composite_foreground, to_filter_graph};
pub use error::{MediaError, MediaResult};
pub use frame::{extract_frame, sample_foreground, ForegroundSample};
pub use fs_utils::{file_size, move_file};
pub use geometry::{compute_plan, GeometryConfig};
pub use normalize::{normalize_in_place, normalize_video};
pub use probe::{probe_image_dimensions, probe_video, VideoInfo};
