//! Error types for the core crate.

use crate::conflict::Conflict;
use thiserror::Error;
use vguard_snapshot::SnapshotError;

/// Kind of record a [`GuardianError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Snapshot,
    Backup,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Snapshot => f.write_str("snapshot"),
            RecordKind::Backup => f.write_str("backup"),
        }
    }
}

/// Errors returned by the version engine.
///
/// Structural failures abort an operation before anything is mutated.
/// Per-file problems during multi-file operations are reported in the
/// operation's result instead.
#[derive(Debug, Error)]
pub enum GuardianError {
    /// Unknown snapshot or backup id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    /// IO error outside of per-file processing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A mutating operation was attempted while another one is in flight.
    #[error("cannot {operation}: {in_flight} is already in progress")]
    ConcurrencyRejected {
        operation: &'static str,
        in_flight: &'static str,
    },

    /// A persisted record is corrupt or unreadable.
    #[error("record {id} failed validation: {message}")]
    Validation { id: String, message: String },

    /// Confidence is below threshold and nobody confirmed a resolution.
    #[error("{} conflict(s) in {path} need confirmation", conflicts.len())]
    ConflictUnresolved {
        path: String,
        conflicts: Vec<Conflict>,
    },

    /// The operation was cancelled before anything was persisted.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Storage or scanning error not covered above.
    #[error("storage error: {0}")]
    Storage(String),
}

impl GuardianError {
    pub fn snapshot_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: RecordKind::Snapshot,
            id: id.into(),
        }
    }

    pub fn backup_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: RecordKind::Backup,
            id: id.into(),
        }
    }

    pub fn validation(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            id: id.into(),
            message: message.into(),
        }
    }
}

impl From<SnapshotError> for GuardianError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::NotFound(id) => Self::snapshot_not_found(id),
            SnapshotError::Corrupted { id, message } => Self::Validation { id, message },
            SnapshotError::Io(e) => Self::Io(e),
            SnapshotError::Cancelled => Self::Cancelled,
            SnapshotError::InvalidPattern { pattern, message } => {
                Self::Config(ConfigError::Validation {
                    message: format!("invalid ignore pattern '{pattern}': {message}"),
                })
            }
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<vguard_storage::StorageError> for GuardianError {
    fn from(err: vguard_storage::StorageError) -> Self {
        SnapshotError::from(err).into()
    }
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    /// File reference not found during substitution.
    #[error("file reference not found: {path}")]
    FileRefNotFound { path: String },

    /// Invalid path (e.g., could not determine config directory).
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for core operations.
pub type GuardianResult<T> = Result<T, GuardianError>;
