use crate::error::PortError;
use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Bucket backed by a local directory; keys are relative paths under `root`.
#[derive(Clone, Debug)]
pub struct FsBucket {
    name: String,
    root: PathBuf,
}

impl FsBucket {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, PortError> {
        let relative = Path::new(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(format!("invalid object key {:?}", key).into());
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StoragePort for FsBucket {
    fn bucket(&self) -> String {
        self.name.clone()
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<(), PortError> {
        let source = self.resolve(key)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, local_path).await?;
        Ok(())
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), PortError> {
        let dest = self.resolve(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, dest).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PortError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let key = path
                    .strip_prefix(&self.root)?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), PortError> {
        tokio::fs::remove_file(self.resolve(key)?).await?;
        Ok(())
    }
}
