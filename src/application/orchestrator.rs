use super::cloud_client::CloudTranscode;
use super::local_worker::{ensure_input, remove_partial, LocalTranscodeWorker};
use crate::domain::av::cmd::MediaToolkit;
use crate::domain::estimate::estimate_processing_time;
use crate::domain::media::{OutputNames, TranscodeResult, UploadRequest};
use crate::error::IngestError;
use crate::ports::ids::IdGenerator;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Picks the transcode path for an upload and assembles the result.
///
/// Raw uploads (`convert = false`) are always stored locally. Conversions go
/// through the cloud client when one is configured, otherwise through the
/// local encoder; in both cases thumbnail and resolution come from the local
/// worker.
pub struct IngestionOrchestrator<T, G> {
    local: LocalTranscodeWorker<T, G>,
    cloud: Option<Arc<dyn CloudTranscode>>,
}

impl<T, G> IngestionOrchestrator<T, G>
where
    T: MediaToolkit,
    G: IdGenerator,
{
    pub fn new(local: LocalTranscodeWorker<T, G>) -> Self {
        Self { local, cloud: None }
    }

    pub fn with_cloud(mut self, cloud: Arc<dyn CloudTranscode>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn uses_cloud(&self) -> bool {
        self.cloud.is_some()
    }

    pub async fn ingest(
        &self,
        request: &UploadRequest,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodeResult, IngestError> {
        match (&self.cloud, request.convert) {
            (Some(cloud), true) => {
                self.ingest_via_cloud(cloud.as_ref(), &request.input_path, output_dir, cancel)
                    .await
            }
            (_, convert) => {
                self.local
                    .process(&request.input_path, output_dir, convert)
                    .await
            }
        }
    }

    async fn ingest_via_cloud(
        &self,
        cloud: &dyn CloudTranscode,
        input: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<TranscodeResult, IngestError> {
        ensure_input(input).await?;
        let processing_estimate = estimate_processing_time(input).await;

        let names = OutputNames::converted(output_dir, &self.local.next_id());
        let source = self.local.probe_source(input).await;

        info!(input = %input.display(), output = %names.video.display(), "Ingesting through cloud transcoder");
        if let Err(e) = cloud.transcode(input, &names.video, source, cancel).await {
            remove_partial(&names.video).await;
            return Err(e);
        }

        self.local
            .generate_thumbnail(&names.video, &names.thumbnail)
            .await;
        let resolution = self.local.probe_resolution(&names.video).await;

        Ok(TranscodeResult {
            video_path: names.video,
            thumbnail_path: names.thumbnail,
            resolution,
            processing_estimate,
            converted: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cloud_client::MockCloudTranscode;
    use crate::domain::av::cmd::MockMediaToolkit;
    use crate::domain::av::stream::{ProbeReport, VideoStream};
    use crate::domain::media::Resolution;
    use crate::error::FailureKind;
    use crate::ports::ids::MockIdGenerator;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn ids() -> MockIdGenerator {
        let mut ids = MockIdGenerator::new();
        ids.expect_next_id().returning(|| "vid".to_string());
        ids
    }

    fn report(width: u32, height: u32) -> ProbeReport {
        ProbeReport {
            duration: Some(1.0),
            video_streams: vec![VideoStream {
                codec: "h264".to_string(),
                width,
                height,
                frame_rate: Some(24.0),
            }],
            audio_streams: vec![],
        }
    }

    fn request(input: PathBuf, convert: bool) -> UploadRequest {
        UploadRequest::new(input, "clip.mov".to_string(), None, convert, 1)
    }

    #[tokio::test]
    async fn test_convert_with_cloud_uses_cloud_body_and_local_thumbnail() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mov");
        std::fs::write(&input, b"source").unwrap();

        let mut toolkit = MockMediaToolkit::new();
        toolkit.expect_transcode().never();
        toolkit
            .expect_extract_thumbnail()
            .withf(|video, _, _| video.file_name().unwrap() == "vid.mp4")
            .times(1)
            .returning(|_, _, _| Ok(()));
        // source probe, then output probe
        toolkit
            .expect_probe()
            .withf(|p| p.file_name().unwrap() == "clip.mov")
            .returning(|_| Ok(report(1920, 1080)));
        toolkit
            .expect_probe()
            .withf(|p| p.file_name().unwrap() == "vid.mp4")
            .returning(|_| Ok(report(1280, 720)));

        let mut cloud = MockCloudTranscode::new();
        cloud
            .expect_transcode()
            .withf(|_, output, source, _| {
                output.file_name().unwrap() == "vid.mp4"
                    && source.map(|s| s.width) == Some(1920)
            })
            .times(1)
            .returning(|_, output, _, _| {
                std::fs::write(output, b"from the cloud").unwrap();
                Ok(())
            });

        let orchestrator = IngestionOrchestrator::new(LocalTranscodeWorker::new(toolkit, ids()))
            .with_cloud(Arc::new(cloud));
        let result = orchestrator
            .ingest(&request(input, true), dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.video_path, dir.path().join("vid.mp4"));
        assert_eq!(result.resolution, Resolution { width: 1280, height: 720 });
        assert!(result.converted);
    }

    #[tokio::test]
    async fn test_raw_upload_skips_cloud() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mov");
        std::fs::write(&input, b"source").unwrap();

        let mut toolkit = MockMediaToolkit::new();
        toolkit.expect_extract_thumbnail().returning(|_, _, _| Ok(()));
        toolkit.expect_probe().returning(|_| Ok(report(640, 480)));
        let mut cloud = MockCloudTranscode::new();
        cloud.expect_transcode().never();

        let orchestrator = IngestionOrchestrator::new(LocalTranscodeWorker::new(toolkit, ids()))
            .with_cloud(Arc::new(cloud));
        let result = orchestrator
            .ingest(&request(input.clone(), false), dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.video_path, dir.path().join("vid.mov"));
        assert_eq!(std::fs::read(result.video_path).unwrap(), b"source");
        assert!(!result.converted);
    }

    #[tokio::test]
    async fn test_convert_without_cloud_encodes_locally() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mov");
        std::fs::write(&input, b"source").unwrap();

        let mut toolkit = MockMediaToolkit::new();
        toolkit.expect_transcode().times(1).returning(|_, output, _| {
            std::fs::write(output, b"local").unwrap();
            Ok(())
        });
        toolkit.expect_extract_thumbnail().returning(|_, _, _| Ok(()));
        toolkit.expect_probe().returning(|_| Ok(report(640, 480)));

        let orchestrator = IngestionOrchestrator::new(LocalTranscodeWorker::new(toolkit, ids()));
        assert!(!orchestrator.uses_cloud());
        let result = orchestrator
            .ingest(&request(input, true), dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read(result.video_path).unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_cloud_failure_leaves_no_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mov");
        std::fs::write(&input, b"source").unwrap();

        let mut toolkit = MockMediaToolkit::new();
        toolkit.expect_probe().returning(|_| Ok(report(640, 480)));
        toolkit.expect_extract_thumbnail().never();
        let mut cloud = MockCloudTranscode::new();
        cloud.expect_transcode().returning(|_, output, _, _| {
            std::fs::write(output, b"partial").unwrap();
            Err(IngestError::new(FailureKind::Timeout, "still running"))
        });

        let orchestrator = IngestionOrchestrator::new(LocalTranscodeWorker::new(toolkit, ids()))
            .with_cloud(Arc::new(cloud));
        let err = orchestrator
            .ingest(&request(input, true), dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::Timeout);
        assert!(!dir.path().join("vid.mp4").exists());
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_cloud_call() {
        let dir = tempdir().unwrap();
        let toolkit = MockMediaToolkit::new();
        let mut cloud = MockCloudTranscode::new();
        cloud.expect_transcode().never();

        let orchestrator = IngestionOrchestrator::new(LocalTranscodeWorker::new(toolkit, ids()))
            .with_cloud(Arc::new(cloud));
        let err = orchestrator
            .ingest(
                &request(dir.path().join("gone.mov"), true),
                dir.path(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Input);
    }
}
