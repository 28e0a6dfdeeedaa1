//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be serialized for writing.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored record exists but could not be decoded.
    #[error("Corrupt record {key}: {message}")]
    Corrupt { key: String, message: String },

    /// A create-only write found an existing record.
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    /// Invalid key format
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StorageError {
    /// Create a corrupt-record error for the given key.
    pub fn corrupt(key: &[&str], message: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.join("/"),
            message: message.into(),
        }
    }

    /// Create an already-exists error for the given key.
    pub fn already_exists(key: &[&str]) -> Self {
        Self::AlreadyExists(key.join("/"))
    }

    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }
}
