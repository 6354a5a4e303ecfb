use crate::error::PortError;
use async_trait::async_trait;
use std::path::Path;

/// Object storage bound to a single bucket.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Bucket name, used to build `gs://`-style URIs
    fn bucket(&self) -> String;

    /// Download a file from storage to a local path
    async fn download(&self, key: &str, local_path: &Path) -> Result<(), PortError>;

    /// Upload a file from a local path to storage
    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), PortError>;

    /// Keys of every object under `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>, PortError>;

    async fn delete(&self, key: &str) -> Result<(), PortError>;
}
