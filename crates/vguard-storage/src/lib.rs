//! Record storage for vguard.
//!
//! This crate provides a key-value storage abstraction for immutable JSON
//! records with two backends:
//! - JSON file storage (durable, one file per record)
//! - In-memory storage (for testing)

pub mod error;
pub mod json;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use json::JsonStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// A trait for key-value storage backends.
///
/// Keys are represented as path segments, e.g. `["snapshots", "snp_01h..."]`.
/// Values are serialized/deserialized as JSON. A record that exists but does
/// not decode is reported as [`StorageError::Corrupt`] with its key; the
/// storage never rewrites it.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a value from storage.
    ///
    /// Returns `None` if the key doesn't exist.
    async fn read<T: DeserializeOwned + Send>(&self, key: &[&str]) -> StorageResult<Option<T>>;

    /// Write a value to storage, replacing any previous value.
    ///
    /// Returns only once the value is durable.
    async fn write<T: Serialize + Send + Sync>(&self, key: &[&str], value: &T)
        -> StorageResult<()>;

    /// Write a value that must not already exist.
    ///
    /// Fails with [`StorageError::AlreadyExists`] instead of overwriting.
    async fn create<T: Serialize + Send + Sync>(
        &self,
        key: &[&str],
        value: &T,
    ) -> StorageResult<()> {
        if self.exists(key).await? {
            return Err(StorageError::already_exists(key));
        }
        self.write(key, value).await
    }

    /// Remove a value from storage.
    ///
    /// Returns whether a value was present.
    async fn remove(&self, key: &[&str]) -> StorageResult<bool>;

    /// List the names of the records directly under a prefix, sorted.
    async fn list(&self, prefix: &[&str]) -> StorageResult<Vec<String>>;

    /// Check if a key exists.
    async fn exists(&self, key: &[&str]) -> StorageResult<bool>;
}
