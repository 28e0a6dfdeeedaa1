//! In-memory storage implementation for testing.

use crate::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory storage for testing.
///
/// This stores all data in memory and is not persistent.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw text under a key, bypassing serialization.
    ///
    /// Lets tests plant records that fail to decode.
    pub fn insert_raw(&self, key: &[&str], raw: impl Into<String>) -> StorageResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        data.insert(Self::key_to_string(key), raw.into());
        Ok(())
    }

    /// Convert a key slice to a storage key string.
    fn key_to_string(key: &[&str]) -> String {
        key.join("/")
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read<T: DeserializeOwned + Send>(&self, key: &[&str]) -> StorageResult<Option<T>> {
        let key_str = Self::key_to_string(key);
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        match data.get(&key_str) {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| StorageError::corrupt(key, e.to_string())),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize + Send + Sync>(
        &self,
        key: &[&str],
        value: &T,
    ) -> StorageResult<()> {
        let key_str = Self::key_to_string(key);
        let json = serde_json::to_string(value)?;

        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        data.insert(key_str, json);

        Ok(())
    }

    async fn create<T: Serialize + Send + Sync>(
        &self,
        key: &[&str],
        value: &T,
    ) -> StorageResult<()> {
        let key_str = Self::key_to_string(key);
        let json = serde_json::to_string(value)?;

        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        if data.contains_key(&key_str) {
            return Err(StorageError::already_exists(key));
        }
        data.insert(key_str, json);

        Ok(())
    }

    async fn remove(&self, key: &[&str]) -> StorageResult<bool> {
        let key_str = Self::key_to_string(key);
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        Ok(data.remove(&key_str).is_some())
    }

    async fn list(&self, prefix: &[&str]) -> StorageResult<Vec<String>> {
        let prefix_with_sep = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", Self::key_to_string(prefix))
        };

        let data = self
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        // BTreeMap keys are already sorted; only direct children are listed
        Ok(data
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix_with_sep))
            .filter(|rest| !rest.contains('/'))
            .map(|rest| rest.to_string())
            .collect())
    }

    async fn exists(&self, key: &[&str]) -> StorageResult<bool> {
        let key_str = Self::key_to_string(key);
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        Ok(data.contains_key(&key_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct Record {
        name: String,
    }

    fn record(name: &str) -> Record {
        Record {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();

        storage.write(&["snapshots", "a"], &record("a")).await.unwrap();

        let read: Option<Record> = storage.read(&["snapshots", "a"]).await.unwrap();
        assert_eq!(read, Some(record("a")));
        assert!(storage.exists(&["snapshots", "a"]).await.unwrap());
        assert!(!storage.exists(&["snapshots", "b"]).await.unwrap());

        assert!(storage.remove(&["snapshots", "a"]).await.unwrap());
        assert!(!storage.remove(&["snapshots", "a"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_storage_list_direct_children_only() {
        let storage = MemoryStorage::new();

        storage.write(&["snapshots", "b"], &record("b")).await.unwrap();
        storage.write(&["snapshots", "a"], &record("a")).await.unwrap();
        storage
            .write(&["snapshots", "nested", "c"], &record("c"))
            .await
            .unwrap();
        storage.write(&["other", "d"], &record("d")).await.unwrap();

        let items = storage.list(&["snapshots"]).await.unwrap();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_memory_storage_create_is_exclusive() {
        let storage = MemoryStorage::new();

        storage.create(&["k"], &record("first")).await.unwrap();
        assert!(matches!(
            storage.create(&["k"], &record("second")).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_storage_corrupt_record() {
        let storage = MemoryStorage::new();
        storage.insert_raw(&["snapshots", "bad"], "not json").unwrap();

        let err = storage
            .read::<Record>(&["snapshots", "bad"])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
