use super::local_worker::remove_partial;
use super::orchestrator::IngestionOrchestrator;
use crate::domain::av::cmd::MediaToolkit;
use crate::domain::media::{TranscodeResult, UploadRequest, VideoRecord};
use crate::error::{FailureKind, IngestError};
use crate::ports::ids::IdGenerator;
use crate::ports::repository::VideoRepository;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub const DEFAULT_MAX_CONCURRENT_INGESTS: usize = 2;

/// Outcome of a successful ingestion, after the record was stored.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub video_id: i64,
    pub record: VideoRecord,
    pub result: TranscodeResult,
}

/// Runs ingestions off the request path and persists their records.
///
/// Each call is executed on its own task; the semaphore bounds how many
/// encoders or cloud polls run at once.
pub struct IngestService<T, G, R> {
    orchestrator: Arc<IngestionOrchestrator<T, G>>,
    repo: Arc<R>,
    permits: Arc<Semaphore>,
    output_dir: PathBuf,
    shutdown: CancellationToken,
}

impl<T, G, R> IngestService<T, G, R>
where
    T: MediaToolkit + 'static,
    G: IdGenerator + 'static,
    R: VideoRepository + 'static,
{
    pub fn new(
        orchestrator: IngestionOrchestrator<T, G>,
        repo: R,
        output_dir: PathBuf,
        max_concurrent: usize,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            repo: Arc::new(repo),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            output_dir,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Ingest `request` and store its record. Nothing is persisted unless
    /// every fatal step succeeded. The staged upload at `request.input_path`
    /// is consumed: it is removed once the ingestion is over, whatever the outcome.
    pub async fn ingest(&self, request: UploadRequest) -> Result<IngestReceipt, IngestError> {
        let orchestrator = self.orchestrator.clone();
        let repo = self.repo.clone();
        let permits = self.permits.clone();
        let output_dir = self.output_dir.clone();
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            let outcome = async {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| IngestError::new(FailureKind::Cancelled, "ingest service closed"))?;

                let result = orchestrator.ingest(&request, &output_dir, &cancel).await?;
                persist(repo.as_ref(), &request, result).await
            }
            .await;

            remove_partial(&request.input_path).await;
            outcome
        })
        .await?
    }

    /// Cancel in-flight cloud polls and refuse new work.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.permits.close();
    }
}

async fn persist<R: VideoRepository>(
    repo: &R,
    request: &UploadRequest,
    result: TranscodeResult,
) -> Result<IngestReceipt, IngestError> {
    let record = VideoRecord::from_result(request, &result);

    match repo.insert_video(&record).await {
        Ok(video_id) => {
            info!(video_id, filename = %record.filename, title = %record.title, "Video ingested");
            Ok(IngestReceipt {
                video_id,
                record,
                result,
            })
        }
        Err(e) => {
            error!(filename = %record.filename, error = %e, "Could not store video record, discarding output");
            for path in [&result.video_path, &result.thumbnail_path] {
                remove_partial(path).await;
            }
            Err(IngestError::new(
                FailureKind::Persistence,
                format!("failed to store video record: {}", e),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::local_worker::LocalTranscodeWorker;
    use crate::domain::av::cmd::MockMediaToolkit;
    use crate::domain::av::stream::ProbeReport;
    use crate::ports::ids::MockIdGenerator;
    use crate::ports::repository::MockVideoRepository;
    use tempfile::tempdir;

    fn orchestrator(encode_ok: bool) -> IngestionOrchestrator<MockMediaToolkit, MockIdGenerator> {
        let mut toolkit = MockMediaToolkit::new();
        toolkit.expect_transcode().returning(move |_, output, _| {
            if encode_ok {
                std::fs::write(output, b"encoded").unwrap();
                Ok(())
            } else {
                Err(IngestError::encode("boom"))
            }
        });
        toolkit.expect_extract_thumbnail().returning(|_, thumb, _| {
            std::fs::write(thumb, b"jpeg").unwrap();
            Ok(())
        });
        toolkit
            .expect_probe()
            .returning(|_| Ok(ProbeReport::default()));
        let mut ids = MockIdGenerator::new();
        ids.expect_next_id().returning(|| "abc".to_string());
        IngestionOrchestrator::new(LocalTranscodeWorker::new(toolkit, ids))
    }

    fn upload(dir: &std::path::Path) -> UploadRequest {
        let input = dir.join("holiday.mov");
        std::fs::write(&input, b"source").unwrap();
        UploadRequest::new(input, "holiday.mov".to_string(), None, true, 42)
    }

    #[tokio::test]
    async fn test_record_is_persisted_after_success() {
        let dir = tempdir().unwrap();
        let mut repo = MockVideoRepository::new();
        repo.expect_insert_video()
            .withf(|record| {
                record.filename == "abc.mp4"
                    && record.title == "holiday"
                    && record.owner_id == 42
                    && record.is_converted
                    && record.views == 0
            })
            .times(1)
            .returning(|_| Ok(7));

        let service = IngestService::new(orchestrator(true), repo, dir.path().to_path_buf(), 2);
        let receipt = service.ingest(upload(dir.path())).await.unwrap();

        assert_eq!(receipt.video_id, 7);
        assert_eq!(receipt.record.original_filename, "holiday.mov");
        assert!(receipt.result.video_path.exists());
        assert!(!dir.path().join("holiday.mov").exists());
    }

    #[tokio::test]
    async fn test_failed_ingest_persists_nothing() {
        let dir = tempdir().unwrap();
        let mut repo = MockVideoRepository::new();
        repo.expect_insert_video().never();

        let service = IngestService::new(orchestrator(false), repo, dir.path().to_path_buf(), 2);
        let err = service.ingest(upload(dir.path())).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Encode);
        assert!(!dir.path().join("holiday.mov").exists());
    }

    #[tokio::test]
    async fn test_repository_failure_discards_output() {
        let dir = tempdir().unwrap();
        let mut repo = MockVideoRepository::new();
        repo.expect_insert_video()
            .returning(|_| Err("database is locked".into()));

        let service = IngestService::new(orchestrator(true), repo, dir.path().to_path_buf(), 1);
        let err = service.ingest(upload(dir.path())).await.unwrap_err();

        assert_eq!(err.kind(), FailureKind::Persistence);
        assert!(!dir.path().join("abc.mp4").exists());
        assert!(!dir.path().join("abc_thumb.jpg").exists());
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_work() {
        let dir = tempdir().unwrap();
        let mut repo = MockVideoRepository::new();
        repo.expect_insert_video().never();

        let service = IngestService::new(orchestrator(true), repo, dir.path().to_path_buf(), 1);
        service.shutdown();
        let err = service.ingest(upload(dir.path())).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Cancelled);
        assert!(!dir.path().join("holiday.mov").exists());
    }
}
