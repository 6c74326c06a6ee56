//! Transcription collaborators.
//!
//! Speech recognition runs outside this worker. The worker only collects
//! timed segments when a provider is configured.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use vseg_models::TranscriptSegment;

use crate::config::TranscriberKind;
use crate::error::{WorkerError, WorkerResult};

#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcribe(&self, media: &Path) -> WorkerResult<Vec<TranscriptSegment>>;
}

/// Returns no segments.
#[derive(Debug, Clone, Default)]
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn transcribe(&self, _media: &Path) -> WorkerResult<Vec<TranscriptSegment>> {
        Ok(Vec::new())
    }
}

/// Reads `{stem}.segments.json` written next to the media (or into
/// `sidecar_dir`) by an external ASR service.
#[derive(Debug, Clone, Default)]
pub struct SegmentFileTranscriber {
    pub sidecar_dir: Option<PathBuf>,
}

impl SegmentFileTranscriber {
    pub fn sidecar_path(&self, media: &Path) -> PathBuf {
        let stem = media
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = format!("{stem}.segments.json");
        match &self.sidecar_dir {
            Some(dir) => dir.join(name),
            None => media.with_file_name(name),
        }
    }
}

#[async_trait]
impl Transcriber for SegmentFileTranscriber {
    fn name(&self) -> &'static str {
        "segment_file"
    }

    async fn transcribe(&self, media: &Path) -> WorkerResult<Vec<TranscriptSegment>> {
        let path = self.sidecar_path(media);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No transcript sidecar");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let segments: Vec<TranscriptSegment> = serde_json::from_slice(&raw)
            .map_err(|e| WorkerError::Transcription(format!("{}: {}", path.display(), e)))?;
        let total = segments.len();
        let valid: Vec<_> = segments.into_iter().filter(|s| s.is_valid()).collect();
        if valid.len() < total {
            tracing::warn!(
                path = %path.display(),
                dropped = total - valid.len(),
                "Dropped invalid transcript segments"
            );
        }
        Ok(valid)
    }
}

pub fn transcriber_from_config(kind: TranscriberKind) -> Arc<dyn Transcriber> {
    match kind {
        TranscriberKind::Disabled => Arc::new(DisabledTranscriber),
        TranscriberKind::SegmentFile => Arc::new(SegmentFileTranscriber {
            sidecar_dir: std::env::var("ASR_SEGMENT_DIR").ok().map(PathBuf::from),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sidecar_segments_are_read_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("talk.mp4");
        tokio::fs::write(
            dir.path().join("talk.segments.json"),
            r#"[{"start":0.0,"end":1.5,"text":"hello"},{"start":3.0,"end":2.0,"text":"bad"}]"#,
        )
        .await
        .unwrap();

        let segments = SegmentFileTranscriber::default().transcribe(&video).await.unwrap();
        assert_eq!(segments, vec![TranscriptSegment::new(0.0, 1.5, "hello")]);
    }

    #[tokio::test]
    async fn test_missing_sidecar_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let segments = SegmentFileTranscriber::default()
            .transcribe(&dir.path().join("none.mp4"))
            .await
            .unwrap();
        assert!(segments.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_sidecar_errors() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("x.segments.json"), "{").await.unwrap();
        let err = SegmentFileTranscriber::default()
            .transcribe(&dir.path().join("x.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Transcription(_)));
    }

    #[tokio::test]
    async fn test_disabled_returns_nothing() {
        assert!(DisabledTranscriber.transcribe(Path::new("a.mp4")).await.unwrap().is_empty());
    }
}
