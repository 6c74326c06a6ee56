//! Container/codec normalization of downloaded segmentation output.

use std::path::Path;

use tokio::sync::watch;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::compose::EncodeSettings;
use crate::error::MediaResult;
use crate::fs_utils::{move_file, sibling_temp_path};

/// Re-encode `input` to H.264/AAC MP4 at `output`.
pub async fn normalize_video(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    cancel: Option<watch::Receiver<bool>>,
) -> MediaResult<()> {
    let cmd = normalize_command(input.as_ref(), output.as_ref());
    let mut runner = FfmpegRunner::new();
    if let Some(rx) = cancel {
        runner = runner.with_cancel(rx);
    }
    runner.run(&cmd).await
}

/// Normalize `path` and atomically replace it with the result.
pub async fn normalize_in_place(path: impl AsRef<Path>, cancel: Option<watch::Receiver<bool>>) -> MediaResult<()> {
    let path = path.as_ref();
    let tmp = sibling_temp_path(path, "norm");

    if let Err(e) = normalize_video(path, &tmp, cancel).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    move_file(&tmp, path).await
}

fn normalize_command(input: &Path, output: &Path) -> FfmpegCommand {
    let cmd = FfmpegCommand::new(output).input(input).map("0:v:0").map("0:a?");
    EncodeSettings::default().apply(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_args() {
        let args = normalize_command(Path::new("in.mov"), Path::new("out.mp4")).build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-i in.mov"));
        assert!(joined.contains("-c:v libx264 -preset fast -crf 20 -pix_fmt yuv420p -c:a aac -b:a 128k"));
        assert!(joined.contains("-movflags +faststart"));
    }
}
