//! Frame sampling for subject detection.

use std::path::Path;

use vseg_models::{Dimensions, PixelRect};

use crate::bbox::{detect_bounding_box, union, BboxOptions};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Positions (fraction of duration) sampled for the subject box.
const SAMPLE_POSITIONS: [f64; 3] = [0.25, 0.5, 0.75];

/// What the compositor needs to know about a segmented foreground.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForegroundSample {
    pub dimensions: Dimensions,
    /// Union of subject boxes over the sampled frames
    pub bbox: Option<PixelRect>,
    pub has_alpha: bool,
}

/// Extract a single frame at `at_secs` as PNG, keeping alpha when present.
pub async fn extract_frame(
    video_path: impl AsRef<Path>,
    at_secs: f64,
    output_png: impl AsRef<Path>,
    keep_alpha: bool,
) -> MediaResult<()> {
    let mut cmd = FfmpegCommand::new(output_png.as_ref())
        .seek(at_secs.max(0.0))
        .input(video_path.as_ref())
        .single_frame();
    if keep_alpha {
        cmd = cmd.output_args(["-pix_fmt", "rgba"]);
    }
    FfmpegRunner::new().with_timeout(60).run(&cmd).await
}

/// Probe a foreground clip and detect where its subject sits.
///
/// Frames that fail to decode are skipped; if no frame yields a box the
/// sample carries `bbox: None` and the geometry falls back to the full frame.
pub async fn sample_foreground(
    video_path: impl AsRef<Path>,
    scratch_dir: impl AsRef<Path>,
    options: BboxOptions,
) -> MediaResult<ForegroundSample> {
    let video_path = video_path.as_ref();
    let info = probe_video(video_path).await?;
    let has_alpha = info.has_alpha();

    let mut bbox: Option<PixelRect> = None;
    for (idx, position) in SAMPLE_POSITIONS.iter().enumerate() {
        let frame_path = scratch_dir.as_ref().join(format!("fg_sample_{idx}.png"));
        let at = info.duration * position;

        if let Err(e) = extract_frame(video_path, at, &frame_path, has_alpha).await {
            tracing::warn!(at_secs = at, error = %e.summary(), "Foreground frame extraction failed");
            continue;
        }

        let detected = tokio::task::spawn_blocking({
            let frame_path = frame_path.clone();
            move || -> MediaResult<Option<PixelRect>> {
                let frame = image::open(&frame_path)?;
                Ok(detect_bounding_box(&frame, options))
            }
        })
        .await
        .map_err(|e| MediaError::internal(format!("bbox task failed: {e}")))?;
        let _ = tokio::fs::remove_file(&frame_path).await;

        match detected {
            Ok(Some(found)) => bbox = Some(bbox.map_or(found, |acc| union(acc, found))),
            Ok(None) => {}
            Err(e) => tracing::warn!(at_secs = at, error = %e, "Foreground frame unreadable"),
        }
    }

    tracing::debug!(?bbox, has_alpha, "Sampled foreground subject");

    Ok(ForegroundSample {
        dimensions: info.dimensions(),
        bbox,
        has_alpha,
    })
}
