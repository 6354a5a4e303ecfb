use super::local_worker::{ensure_input, remove_partial};
use super::retry::{with_retry, RetryPolicy};
use crate::domain::jobs::{CloudJobHandle, CloudStreamProfile, JobState, SourceCharacteristics};
use crate::error::{FailureKind, IngestError};
use crate::ports::storage::StoragePort;
use crate::ports::transcoder::TranscodeJobPort;
use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_POLLS: u32 = 30;

#[derive(Debug, Clone)]
pub struct CloudSettings {
    pub poll_interval: Duration,
    /// Polls before giving up with a timeout
    pub max_polls: u32,
    pub profile: CloudStreamProfile,
    /// Applied to uploads, status polls and downloads
    pub retry: RetryPolicy,
    /// Delete the uploaded input and job outputs once the call is over
    pub cleanup_remote: bool,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
            profile: CloudStreamProfile::default(),
            retry: RetryPolicy::default(),
            cleanup_remote: true,
        }
    }
}

/// Produces a transcoded copy of a local file through a remote service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudTranscode: Send + Sync {
    /// Blocks until `output` holds the transcoded file, the job fails, the
    /// polling budget runs out, or `cancel` fires.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        source: Option<SourceCharacteristics>,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError>;
}

pub struct CloudTranscodeClient<S, J> {
    storage: S,
    jobs: J,
    settings: CloudSettings,
    sequence: AtomicU64,
}

impl<S, J> CloudTranscodeClient<S, J>
where
    S: StoragePort,
    J: TranscodeJobPort,
{
    pub fn new(storage: S, jobs: J, settings: CloudSettings) -> Self {
        Self {
            storage,
            jobs,
            settings,
            sequence: AtomicU64::new(0),
        }
    }

    /// Unique per call, so concurrent jobs never share an output directory.
    fn next_output_prefix(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("output/{}-{}/", Utc::now().timestamp_micros(), seq)
    }

    fn gs_uri(&self, key: &str) -> String {
        format!("gs://{}/{}", self.storage.bucket(), key)
    }

    async fn wait_for_job(
        &self,
        handle: &CloudJobHandle,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        let max_polls = self.settings.max_polls;

        for attempt in 1..=max_polls {
            if cancel.is_cancelled() {
                return Err(cancelled(&handle.name));
            }

            let status = with_retry(&self.settings.retry, "get_job", || {
                self.jobs.get_job(&handle.name)
            })
            .await
            .map_err(|e| IngestError::remote_job(format!("status poll for {} failed: {}", handle.name, e)))?;

            debug!(job = %handle.name, attempt, state = ?status.state, "Polled transcode job");

            match status.state {
                JobState::Succeeded => {
                    info!(job = %handle.name, attempt, "Transcode job succeeded");
                    return Ok(());
                }
                JobState::Failed => {
                    let reason = status.error.unwrap_or_else(|| "no error details".to_string());
                    error!(job = %handle.name, reason = %reason, "Transcode job failed");
                    return Err(IngestError::remote_job(format!(
                        "transcode job {} failed: {}",
                        handle.name, reason
                    )));
                }
                JobState::Unspecified | JobState::Pending | JobState::Running => {}
            }

            if attempt < max_polls {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(cancelled(&handle.name)),
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
        }

        warn!(job = %handle.name, max_polls, "Transcode job timed out");
        Err(IngestError::new(
            FailureKind::Timeout,
            format!(
                "transcode job {} not finished after {} polls",
                handle.name, max_polls
            ),
        ))
    }

    async fn fetch_output(
        &self,
        handle: &CloudJobHandle,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        let keys = with_retry(&self.settings.retry, "list_outputs", || {
            self.storage.list(&handle.output_prefix)
        })
        .await
        .map_err(|e| download_error(format!("listing {} failed: {}", handle.output_prefix, e)))?;

        let suffix = format!(".{}", self.settings.profile.container);
        let key = keys
            .into_iter()
            .find(|k| k.ends_with(&suffix))
            .ok_or_else(|| {
                download_error(format!(
                    "no {} output under {}",
                    self.settings.profile.container, handle.output_prefix
                ))
            })?;

        info!(key = %key, output = %output.display(), "Downloading transcoded video");
        let download = async {
            with_retry(&self.settings.retry, "download", || {
                self.storage.download(&key, output)
            })
            .await
            .map_err(|e| download_error(format!("download of {} failed: {}", key, e)))
        };
        if let Err(e) = until_cancelled(cancel, &handle.name, download).await {
            remove_partial(output).await;
            return Err(e);
        }
        Ok(())
    }

    async fn delete_quietly(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            warn!(key, error = %e, "Could not delete remote object");
        }
    }

    /// Remove everything this call left in the bucket; stop the job too when
    /// it may still be running.
    async fn cleanup(&self, handle: &CloudJobHandle, stop_job: bool) {
        if !self.settings.cleanup_remote {
            return;
        }
        if stop_job {
            if let Err(e) = self.jobs.delete_job(&handle.name).await {
                warn!(job = %handle.name, error = %e, "Could not delete transcode job");
            }
        }

        self.delete_quietly(&handle.input_key).await;
        match self.storage.list(&handle.output_prefix).await {
            Ok(keys) => {
                for key in keys {
                    self.delete_quietly(&key).await;
                }
            }
            Err(e) => warn!(prefix = %handle.output_prefix, error = %e, "Could not list job outputs"),
        }
    }
}

#[async_trait]
impl<S, J> CloudTranscode for CloudTranscodeClient<S, J>
where
    S: StoragePort,
    J: TranscodeJobPort,
{
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        source: Option<SourceCharacteristics>,
        cancel: &CancellationToken,
    ) -> Result<(), IngestError> {
        ensure_input(input).await?;

        let basename = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| IngestError::input(format!("{} has no file name", input.display())))?;
        let input_key = format!("input/{}", basename);
        let output_prefix = self.next_output_prefix();

        info!(input = %input.display(), key = %input_key, "Uploading source for cloud transcode");
        let upload = async {
            with_retry(&self.settings.retry, "upload", || {
                self.storage.upload(input, &input_key)
            })
            .await
            .map_err(|e| IngestError::new(FailureKind::RemoteUpload, format!("upload of {} failed: {}", input_key, e)))
        };
        if let Err(e) = until_cancelled(cancel, &input_key, upload).await {
            if e.kind() == FailureKind::Cancelled && self.settings.cleanup_remote {
                self.delete_quietly(&input_key).await;
            }
            return Err(e);
        }

        let config = self.settings.profile.job_config(
            self.gs_uri(&input_key),
            self.gs_uri(&output_prefix),
            source.as_ref(),
        );

        let name = match self.jobs.create_job(&config).await {
            Ok(name) => name,
            Err(e) => {
                if self.settings.cleanup_remote {
                    self.delete_quietly(&input_key).await;
                }
                return Err(IngestError::remote_job(format!("job creation failed: {}", e)));
            }
        };

        let handle = CloudJobHandle {
            name,
            bucket: self.storage.bucket(),
            location: self.jobs.location(),
            input_key,
            output_prefix,
        };
        info!(job = %handle.name, location = %handle.location, output = %handle.output_prefix, "Transcode job created");

        let outcome = match self.wait_for_job(&handle, cancel).await {
            Ok(()) => self.fetch_output(&handle, output, cancel).await,
            Err(e) => Err(e),
        };

        let stop_job = matches!(
            outcome.as_ref().map_err(IngestError::kind),
            Err(FailureKind::Timeout | FailureKind::Cancelled)
        );
        self.cleanup(&handle, stop_job).await;

        outcome
    }
}

/// Run `step`, giving up as soon as `cancel` fires.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    what: &str,
    step: impl Future<Output = Result<T, IngestError>>,
) -> Result<T, IngestError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled(what)),
        result = step => result,
    }
}

fn cancelled(what: &str) -> IngestError {
    IngestError::new(FailureKind::Cancelled, format!("cloud transcode of {} cancelled", what))
}

fn download_error(message: String) -> IngestError {
    IngestError::new(FailureKind::RemoteDownload, message)
}
