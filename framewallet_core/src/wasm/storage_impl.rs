// WASM localStorage-based preference store

use crate::error::CoreError;
use crate::storage_trait::{StorageBackend, StorageResult};
use async_trait::async_trait;
use log::debug;
use serde::{de::DeserializeOwned, Serialize};
use web_sys::window;

pub struct LocalStorageBackend {
    prefix: String,
}

impl LocalStorageBackend {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn storage(&self) -> StorageResult<web_sys::Storage> {
        window()
            .ok_or_else(|| CoreError::Storage("No window object available".to_string()))?
            .local_storage()
            .map_err(|e| CoreError::Storage(format!("Failed to access localStorage: {:?}", e)))?
            .ok_or_else(|| CoreError::Storage("localStorage not available".to_string()))
    }
}

#[async_trait(?Send)]
impl StorageBackend for LocalStorageBackend {
    async fn save<T: Serialize>(&self, key: &str, data: &T) -> StorageResult<()> {
        let full_key = self.full_key(key);
        let json = serde_json::to_string(data)?;
        self.storage()?
            .set_item(&full_key, &json)
            .map_err(|e| CoreError::Storage(format!("Failed to save {}: {:?}", full_key, e)))?;
        debug!("Saved {} to localStorage", full_key);
        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let full_key = self.full_key(key);
        let json = self
            .storage()?
            .get_item(&full_key)
            .map_err(|e| CoreError::Storage(format!("Failed to read {}: {:?}", full_key, e)))?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let full_key = self.full_key(key);
        self.storage()?
            .remove_item(&full_key)
            .map_err(|e| CoreError::Storage(format!("Failed to remove {}: {:?}", full_key, e)))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);
        let item = self
            .storage()?
            .get_item(&full_key)
            .map_err(|e| CoreError::Storage(format!("Failed to check {}: {:?}", full_key, e)))?;
        Ok(item.is_some())
    }
}
