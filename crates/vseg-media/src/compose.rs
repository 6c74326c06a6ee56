//! Local compositing of a segmented foreground over a still background.

use std::path::Path;

use tokio::sync::watch;
use vseg_models::CompositingPlan;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Key colour of the segmentation matte when no alpha is delivered.
const MATTE_COLOR: &str = "0x000000";
const COLORKEY_SIMILARITY: f64 = 0.10;
const COLORKEY_BLEND: f64 = 0.05;

/// Encoding settings shared by compositing and normalization.
#[derive(Debug, Clone)]
pub struct EncodeSettings {
    pub video_codec: &'static str,
    pub preset: &'static str,
    pub crf: u8,
    pub audio_codec: &'static str,
    pub audio_bitrate: &'static str,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264",
            preset: "fast",
            crf: 20,
            audio_codec: "aac",
            audio_bitrate: "128k",
        }
    }
}

impl EncodeSettings {
    pub(crate) fn apply(&self, cmd: FfmpegCommand) -> FfmpegCommand {
        cmd.video_codec(self.video_codec)
            .preset(self.preset)
            .crf(self.crf)
            .output_args(["-pix_fmt", "yuv420p"])
            .audio_codec(self.audio_codec)
            .audio_bitrate(self.audio_bitrate)
            .faststart()
    }
}

/// Filter graph for input 0 = foreground video, input 1 = background image.
pub fn to_filter_graph(plan: &CompositingPlan) -> String {
    let crop = plan.crop;
    let key = if plan.foreground_has_alpha {
        String::new()
    } else {
        format!(",colorkey={MATTE_COLOR}:{COLORKEY_SIMILARITY:.2}:{COLORKEY_BLEND:.2}")
    };

    format!(
        "[1:v]scale={cw}:{ch},setsar=1[bg];\
         [0:v]crop={w}:{h}:{x}:{y},scale={tw}:{th}{key},format=yuva420p[fg];\
         [bg][fg]overlay={ox}:{oy}:shortest=1,format=yuv420p[out]",
        cw = plan.canvas.width,
        ch = plan.canvas.height,
        w = crop.width,
        h = crop.height,
        x = crop.x,
        y = crop.y,
        tw = plan.target_width,
        th = plan.target_height,
        ox = plan.offset_x,
        oy = plan.offset_y,
    )
}

/// Build the FFmpeg command that renders `plan`.
pub fn composite_command(
    plan: &CompositingPlan,
    foreground: &Path,
    background_image: &Path,
    output: &Path,
) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(output)
        .input(foreground)
        .looped()
        .input(background_image)
        .filter_complex(to_filter_graph(plan))
        .map("[out]")
        .map("0:a?")
        .shortest();
    EncodeSettings::default().apply(cmd)
}

/// Render the foreground onto the background image according to `plan`.
pub async fn composite_foreground(
    plan: &CompositingPlan,
    foreground: impl AsRef<Path>,
    background_image: impl AsRef<Path>,
    output: impl AsRef<Path>,
    cancel: Option<watch::Receiver<bool>>,
) -> MediaResult<()> {
    let cmd = composite_command(plan, foreground.as_ref(), background_image.as_ref(), output.as_ref());

    let mut runner = FfmpegRunner::new();
    if let Some(rx) = cancel {
        runner = runner.with_cancel(rx);
    }

    tracing::info!(
        target_width = plan.target_width,
        target_height = plan.target_height,
        offset_x = plan.offset_x,
        offset_y = plan.offset_y,
        "Compositing foreground"
    );
    runner.run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use vseg_models::{Dimensions, PixelRect};

    fn plan(alpha: bool) -> CompositingPlan {
        CompositingPlan {
            canvas: Dimensions::new(1920, 1080),
            crop: PixelRect::new(400, 100, 400, 400),
            target_width: 540,
            target_height: 540,
            offset_x: 690,
            offset_y: 270,
            foreground_has_alpha: alpha,
        }
    }

    #[test]
    fn test_filter_graph_keys_opaque_foreground() {
        let graph = to_filter_graph(&plan(false));
        assert!(graph.starts_with("[1:v]scale=1920:1080,setsar=1[bg];"));
        assert!(graph.contains("crop=400:400:400:100,scale=540:540,colorkey=0x000000:0.10:0.05"));
        assert!(graph.contains("overlay=690:270:shortest=1"));
        assert!(graph.ends_with("[out]"));
    }

    #[test]
    fn test_filter_graph_alpha_skips_colorkey() {
        let graph = to_filter_graph(&plan(true));
        assert!(!graph.contains("colorkey"));
    }

    #[test]
    fn test_composite_command_args() {
        let args = composite_command(
            &plan(false),
            Path::new("fg.mp4"),
            Path::new("bg.png"),
            Path::new("out.mp4"),
        )
        .build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-i fg.mp4 -loop 1 -i bg.png"));
        assert!(joined.contains("-map [out] -map 0:a?"));
        assert!(joined.contains("-shortest"));
        assert!(joined.contains("-c:v libx264 -preset fast -crf 20"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(joined.ends_with("out.mp4"));
    }
}
