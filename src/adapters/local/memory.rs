use crate::domain::media::VideoRecord;
use crate::error::PortError;
use crate::ports::repository::VideoRepository;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Process-local video table, for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryVideoRepository {
    rows: RwLock<Vec<(i64, VideoRecord)>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn insert_video(&self, record: &VideoRecord) -> Result<i64, PortError> {
        let mut rows = self.rows.write().await;
        let id = rows.last().map(|(id, _)| id + 1).unwrap_or(1);
        rows.push((id, record.clone()));
        Ok(id)
    }

    async fn list_videos(&self) -> Result<Vec<(i64, VideoRecord)>, PortError> {
        let rows = self.rows.read().await;
        let mut videos = rows.clone();
        videos.sort_by(|a, b| b.1.upload_date.cmp(&a.1.upload_date).then(b.0.cmp(&a.0)));
        Ok(videos)
    }
}
