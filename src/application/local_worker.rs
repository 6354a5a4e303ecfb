use crate::domain::av::cmd::{CodecPair, MediaToolkit};
use crate::domain::estimate::estimate_processing_time;
use crate::domain::jobs::SourceCharacteristics;
use crate::domain::media::{OutputNames, Resolution, TranscodeResult};
use crate::error::{FailureKind, IngestError};
use crate::ports::ids::IdGenerator;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_THUMBNAIL_OFFSET: Duration = Duration::from_secs(1);

/// Normalizes uploads with the local encoder and extracts thumbnails.
pub struct LocalTranscodeWorker<T, G> {
    toolkit: T,
    ids: G,
    codecs: CodecPair,
    thumbnail_offset: Duration,
}

impl<T, G> LocalTranscodeWorker<T, G>
where
    T: MediaToolkit,
    G: IdGenerator,
{
    pub fn new(toolkit: T, ids: G) -> Self {
        Self {
            toolkit,
            ids,
            codecs: CodecPair::default(),
            thumbnail_offset: DEFAULT_THUMBNAIL_OFFSET,
        }
    }

    pub fn with_codecs(mut self, codecs: CodecPair) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_thumbnail_offset(mut self, offset: Duration) -> Self {
        self.thumbnail_offset = offset;
        self
    }

    pub fn next_id(&self) -> String {
        self.ids.next_id()
    }

    /// Store `input` under a fresh name in `output_dir`, re-encoding it when
    /// `convert` is set, then grab a thumbnail and probe the result.
    pub async fn process(
        &self,
        input: &Path,
        output_dir: &Path,
        convert: bool,
    ) -> Result<TranscodeResult, IngestError> {
        ensure_input(input).await?;
        let processing_estimate = estimate_processing_time(input).await;

        let id = self.ids.next_id();
        let names = if convert {
            OutputNames::converted(output_dir, &id)
        } else {
            OutputNames::raw_copy(output_dir, &id, input)
        };

        if convert {
            info!(input = %input.display(), output = %names.video.display(), "Converting video");
            if let Err(e) = self.toolkit.transcode(input, &names.video, &self.codecs).await {
                remove_partial(&names.video).await;
                return Err(e);
            }
        } else {
            info!(input = %input.display(), output = %names.video.display(), "Storing raw upload");
            if let Err(e) = tokio::fs::copy(input, &names.video).await {
                remove_partial(&names.video).await;
                return Err(IngestError::new(
                    FailureKind::LocalIo,
                    format!("failed to copy upload: {}", e),
                ));
            }
        }

        self.generate_thumbnail(&names.video, &names.thumbnail).await;
        let resolution = self.probe_resolution(&names.video).await;

        Ok(TranscodeResult {
            video_path: names.video,
            thumbnail_path: names.thumbnail,
            resolution,
            processing_estimate,
            converted: convert,
        })
    }

    /// Best effort: failures are logged and reported as `false`.
    pub async fn generate_thumbnail(&self, video: &Path, thumbnail: &Path) -> bool {
        match self
            .toolkit
            .extract_thumbnail(video, thumbnail, self.thumbnail_offset)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(video = %video.display(), error = %e, "Thumbnail generation failed, continuing without");
                false
            }
        }
    }

    /// Dimensions of the first video stream, `0x0` when probing fails.
    pub async fn probe_resolution(&self, video: &Path) -> Resolution {
        match self.toolkit.probe(video).await {
            Ok(report) => report
                .first_video()
                .map(|v| Resolution {
                    width: v.width,
                    height: v.height,
                })
                .unwrap_or_default(),
            Err(e) => {
                warn!(video = %video.display(), error = %e, "Probe failed, resolution unknown");
                Resolution::default()
            }
        }
    }

    pub async fn probe_source(&self, input: &Path) -> Option<SourceCharacteristics> {
        let report = self.toolkit.probe(input).await.ok()?;
        let video = report.first_video()?;
        Some(SourceCharacteristics {
            width: video.width,
            height: video.height,
            frame_rate: video.frame_rate,
        })
    }
}

/// Fail with an input error unless `path` is a readable regular file.
pub(crate) async fn ensure_input(path: &Path) -> Result<(), IngestError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(IngestError::input(format!(
            "{} is not a regular file",
            path.display()
        ))),
        Err(e) => Err(IngestError::input(format!(
            "cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Delete `path` if it exists; other failures are only logged.
pub async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove file");
        }
    }
}
