//! Error types for the ingestion pipeline.

use std::fmt;

/// What stage of the pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Source file missing or unreadable
    Input,
    /// Local encoder failed
    Encode,
    /// Local filesystem failure while placing the output
    LocalIo,
    RemoteUpload,
    /// Job creation, status polling, or a job reported as failed
    RemoteJob,
    RemoteDownload,
    /// Polling budget exhausted before the job reached a terminal state
    Timeout,
    Cancelled,
    /// The video record could not be stored
    Persistence,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Input => "input",
            FailureKind::Encode => "encode",
            FailureKind::LocalIo => "local-io",
            FailureKind::RemoteUpload => "remote-upload",
            FailureKind::RemoteJob => "remote-job",
            FailureKind::RemoteDownload => "remote-download",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct IngestError {
    kind: FailureKind,
    message: String,
}

impl IngestError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Input, message)
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Encode, message)
    }

    pub fn remote_job(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RemoteJob, message)
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for IngestError {}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::new(FailureKind::LocalIo, err.to_string())
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            IngestError::new(FailureKind::Cancelled, "ingest task was cancelled")
        } else {
            IngestError::new(FailureKind::LocalIo, format!("ingest task panicked: {}", err))
        }
    }
}

/// Boxed error returned by ports.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;
