use crate::domain::jobs::{JobConfig, JobStatus};
use crate::error::PortError;
use async_trait::async_trait;

/// Remote transcoding service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscodeJobPort: Send + Sync {
    /// Submit a job, returning its resource name
    async fn create_job(&self, config: &JobConfig) -> Result<String, PortError>;

    async fn get_job(&self, name: &str) -> Result<JobStatus, PortError>;

    /// Delete (and thereby stop) a job
    async fn delete_job(&self, name: &str) -> Result<(), PortError>;

    /// Region the jobs run in
    fn location(&self) -> String;
}
