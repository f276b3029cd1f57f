// File-backed preference store for the native harness

use crate::error::CoreError;
use crate::storage_trait::{StorageBackend, StorageResult};
use async_trait::async_trait;
use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;

/// One JSON file per key under `base_dir`, named `<prefix><key>.json`.
pub struct FileStorage {
    base_dir: PathBuf,
    prefix: String,
}

impl FileStorage {
    pub fn new(base_dir: PathBuf, prefix: impl Into<String>) -> Self {
        Self {
            base_dir,
            prefix: prefix.into(),
        }
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(CoreError::Storage(format!("invalid preference key: {:?}", key)));
        }
        Ok(self.base_dir.join(format!("{}{}.json", self.prefix, key)))
    }
}

#[async_trait(?Send)]
impl StorageBackend for FileStorage {
    async fn save<T: Serialize>(&self, key: &str, data: &T) -> StorageResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| CoreError::Io(format!("Failed to create {:?}: {}", self.base_dir, e)))?;
        let json = serde_json::to_string_pretty(data)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| CoreError::Io(format!("Failed to write {:?}: {}", path, e)))?;
        debug!("Saved preference {} to {:?}", key, path);
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let path = self.path_for(key)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No stored preference {}", key);
                return Ok(None);
            }
            Err(e) => return Err(CoreError::Io(format!("Failed to read {:?}: {}", path, e))),
        };
        Ok(Some(serde_json::from_str(&json)?))
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Io(format!("Failed to remove {:?}: {}", path, e))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }
}
