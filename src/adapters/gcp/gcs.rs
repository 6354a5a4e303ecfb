use super::auth::AccessTokenSource;
use crate::error::PortError;
use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

pub const GCS_API_BASE: &str = "https://storage.googleapis.com";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectItem {
    name: String,
}

/// Cloud Storage bucket accessed through the JSON API.
pub struct GcsStorage {
    http: reqwest::Client,
    bucket: String,
    base_url: String,
    auth: Arc<AccessTokenSource>,
}

impl GcsStorage {
    pub fn new(http: reqwest::Client, bucket: impl Into<String>, auth: Arc<AccessTokenSource>) -> Self {
        Self {
            http,
            bucket: bucket.into(),
            base_url: GCS_API_BASE.to_string(),
            auth,
        }
    }

    /// Point at another endpoint, such as a storage emulator.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.base_url,
            self.bucket,
            urlencoding::encode(key)
        )
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.base_url,
            self.bucket,
            urlencoding::encode(key)
        )
    }

    fn list_url(&self, prefix: &str, page_token: Option<&str>) -> String {
        let mut url = format!(
            "{}/storage/v1/b/{}/o?prefix={}",
            self.base_url,
            self.bucket,
            urlencoding::encode(prefix)
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }
}

async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response, PortError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!("GCS {} failed with status {}: {}", action, status, body).into())
}

#[async_trait]
impl StoragePort for GcsStorage {
    fn bucket(&self) -> String {
        self.bucket.clone()
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<(), PortError> {
        debug!(key, "Downloading from GCS");
        let response = self
            .http
            .get(format!("{}?alt=media", self.object_url(key)))
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;
        let response = check(response, "download").await?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(local_path).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!(key, bytes = written, "Downloaded from GCS");
        Ok(())
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), PortError> {
        let file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();

        debug!(key, size, "Uploading to GCS");
        let response = self
            .http
            .post(self.upload_url(key))
            .bearer_auth(self.auth.token().await?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        check(response, "upload").await?;

        info!(key, size, "Uploaded to GCS");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PortError> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let response = self
                .http
                .get(self.list_url(prefix, page_token.as_deref()))
                .bearer_auth(self.auth.token().await?)
                .send()
                .await?;
            let page: ObjectList = check(response, "list").await?.json().await?;

            keys.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), PortError> {
        let response = self
            .http
            .delete(self.object_url(key))
            .bearer_auth(self.auth.token().await?)
            .send()
            .await?;
        check(response, "delete").await?;
        debug!(key, "Deleted from GCS");
        Ok(())
    }
}
