use super::stream::ProbeReport;
use super::thumbnails::extract_frame;
use crate::error::IngestError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command as TokioCommand;

/// Codecs used by local re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecPair {
    pub video: String,
    pub audio: String,
}

impl Default for CodecPair {
    fn default() -> Self {
        Self {
            video: "libx264".to_string(),
            audio: "aac".to_string(),
        }
    }
}

/// Everything the pipeline asks of the local encoder.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path, codecs: &CodecPair)
        -> Result<(), IngestError>;

    /// Write a single frame taken `offset` into `video` to `output`.
    async fn extract_thumbnail(
        &self,
        video: &Path,
        output: &Path,
        offset: Duration,
    ) -> Result<(), IngestError>;

    async fn probe(&self, media: &Path) -> Result<ProbeReport, IngestError>;
}

/// Runs the `ffmpeg`/`ffprobe` binaries found on `PATH`.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg_bin: String,
    ffprobe_bin: String,
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegToolkit {
    pub fn new(ffmpeg_bin: impl Into<String>, ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    async fn run_ffmpeg_transcode(
        &self,
        input: &Path,
        output: &Path,
        codecs: &CodecPair,
    ) -> std::io::Result<Output> {
        TokioCommand::new(&self.ffmpeg_bin)
            .arg("-y")
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(input)
            .arg("-c:v")
            .arg(&codecs.video)
            .arg("-c:a")
            .arg(&codecs.audio)
            .arg(output)
            .kill_on_drop(true)
            .output()
            .await
    }

    async fn run_ffprobe(&self, media: &Path) -> std::io::Result<Output> {
        TokioCommand::new(&self.ffprobe_bin)
            .arg("-v")
            .arg("error")
            .arg("-show_format")
            .arg("-show_streams")
            .arg("-print_format")
            .arg("json")
            .arg(media)
            .output()
            .await
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        codecs: &CodecPair,
    ) -> Result<(), IngestError> {
        let out = self
            .run_ffmpeg_transcode(input, output, codecs)
            .await
            .map_err(|e| IngestError::encode(format!("failed to spawn {}: {}", self.ffmpeg_bin, e)))?;

        if !out.status.success() {
            return Err(IngestError::encode(format!(
                "ffmpeg exited with {}: {}",
                out.status,
                stderr_tail(&out.stderr)
            )));
        }
        Ok(())
    }

    async fn extract_thumbnail(
        &self,
        video: &Path,
        output: &Path,
        offset: Duration,
    ) -> Result<(), IngestError> {
        extract_frame(video, output, offset)
            .await
            .map_err(|e| IngestError::encode(format!("thumbnail extraction failed: {}", e)))
    }

    async fn probe(&self, media: &Path) -> Result<ProbeReport, IngestError> {
        let out = self
            .run_ffprobe(media)
            .await
            .map_err(|e| IngestError::input(format!("failed to spawn {}: {}", self.ffprobe_bin, e)))?;

        if !out.status.success() {
            return Err(IngestError::input(format!(
                "ffprobe exited with {}: {}",
                out.status,
                stderr_tail(&out.stderr)
            )));
        }

        let v: serde_json::Value = serde_json::from_slice(&out.stdout)
            .map_err(|e| IngestError::input(format!("unreadable ffprobe output: {}", e)))?;
        Ok(ProbeReport::from_json(&v))
    }
}

/// Last few lines of encoder stderr, enough to tell what went wrong.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join(" | ")
}
