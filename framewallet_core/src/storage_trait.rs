// Storage abstraction - file-based (native) and localStorage (WASM)

use crate::error::CoreError;
use async_trait::async_trait;
use log::warn;
use serde::{de::DeserializeOwned, Serialize};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, CoreError>;

/// Persisted preference store.
#[async_trait(?Send)]
pub trait StorageBackend {
    async fn save<T: Serialize>(&self, key: &str, data: &T) -> StorageResult<()>;

    async fn load<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>>;

    async fn remove(&self, key: &str) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

/// Standard storage keys
pub mod keys {
    pub const THEME: &str = "theme";
}

/// Read the persisted display theme once at startup. Absence or a failed
/// read falls back to `default`.
pub async fn load_theme<S: StorageBackend>(storage: &S, default: &str) -> String {
    match storage.load::<String>(keys::THEME).await {
        Ok(Some(theme)) if !theme.is_empty() => theme,
        Ok(_) => default.to_string(),
        Err(e) => {
            warn!("Failed to read persisted theme: {}", e);
            default.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryStorage {
        values: RefCell<HashMap<String, String>>,
        broken: bool,
    }

    #[async_trait(?Send)]
    impl StorageBackend for MemoryStorage {
        async fn save<T: Serialize>(&self, key: &str, data: &T) -> StorageResult<()> {
            self.values
                .borrow_mut()
                .insert(key.to_string(), serde_json::to_string(data)?);
            Ok(())
        }

        async fn load<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
            if self.broken {
                return Err(CoreError::Storage("backend unavailable".into()));
            }
            match self.values.borrow().get(key) {
                Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
                None => Ok(None),
            }
        }

        async fn remove(&self, key: &str) -> StorageResult<()> {
            self.values.borrow_mut().remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> StorageResult<bool> {
            Ok(self.values.borrow().contains_key(key))
        }
    }

    #[tokio::test]
    async fn theme_falls_back_to_default() {
        let storage = MemoryStorage::default();
        assert_eq!(load_theme(&storage, "light").await, "light");

        storage.save(keys::THEME, &"dark".to_string()).await.unwrap();
        assert_eq!(load_theme(&storage, "light").await, "dark");

        let broken = MemoryStorage {
            broken: true,
            ..Default::default()
        };
        assert_eq!(load_theme(&broken, "light").await, "light");
    }
}
