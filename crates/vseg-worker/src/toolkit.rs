//! Media operations the orchestrator needs, behind a trait so tests can
//! run the pipeline without FFmpeg.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::watch;
use vseg_media::{BboxOptions, ForegroundSample, MediaResult, VideoInfo};
use vseg_models::{CompositingPlan, Dimensions};

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn probe(&self, video: &Path) -> MediaResult<VideoInfo>;

    async fn image_dimensions(&self, image: &Path) -> MediaResult<Dimensions>;

    /// Size, subject box and alpha presence of a segmented clip.
    async fn inspect_foreground(&self, video: &Path, scratch_dir: &Path) -> MediaResult<ForegroundSample>;

    /// Re-encode `video` in place to the delivery format.
    async fn normalize(&self, video: &Path, cancel: watch::Receiver<bool>) -> MediaResult<()>;

    async fn composite(
        &self,
        plan: &CompositingPlan,
        foreground: &Path,
        background: &Path,
        output: &Path,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()>;
}

/// Production toolkit backed by the FFmpeg CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegToolkit {
    pub bbox: BboxOptions,
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, video: &Path) -> MediaResult<VideoInfo> {
        vseg_media::probe_video(video).await
    }

    async fn image_dimensions(&self, image: &Path) -> MediaResult<Dimensions> {
        vseg_media::probe_image_dimensions(image).await
    }

    async fn inspect_foreground(&self, video: &Path, scratch_dir: &Path) -> MediaResult<ForegroundSample> {
        vseg_media::sample_foreground(video, scratch_dir, self.bbox).await
    }

    async fn normalize(&self, video: &Path, cancel: watch::Receiver<bool>) -> MediaResult<()> {
        vseg_media::normalize_in_place(video, Some(cancel)).await
    }

    async fn composite(
        &self,
        plan: &CompositingPlan,
        foreground: &Path,
        background: &Path,
        output: &Path,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        vseg_media::composite_foreground(plan, foreground, background, output, Some(cancel)).await
    }
}
