use crate::domain::media::VideoRecord;
use crate::error::PortError;
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Persist a fully ingested video, returning its id
    async fn insert_video(&self, record: &VideoRecord) -> Result<i64, PortError>;

    /// Most recent uploads first
    async fn list_videos(&self) -> Result<Vec<(i64, VideoRecord)>, PortError>;
}
