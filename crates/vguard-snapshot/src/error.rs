//! Snapshot error types.

use thiserror::Error;
use vguard_storage::StorageError;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot not found.
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// A persisted snapshot record is unreadable.
    #[error("Snapshot {id} is corrupted: {message}")]
    Corrupted { id: String, message: String },

    /// The operation was cancelled before anything was persisted.
    #[error("Snapshot operation cancelled")]
    Cancelled,

    /// A path could not be expressed relative to the project root.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid ignore pattern.
    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Operation failed.
    #[error("Snapshot operation failed: {0}")]
    OperationFailed(String),
}

impl SnapshotError {
    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create a corrupted record error.
    pub fn corrupted(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed(message.into())
    }
}

impl From<StorageError> for SnapshotError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupt { key, message } => {
                // Report the record id, not the full storage key.
                let id = key.rsplit('/').next().unwrap_or(&key).to_string();
                Self::Corrupted { id, message }
            }
            StorageError::Io(e) => Self::Io(e),
            other => Self::Storage(other),
        }
    }
}
