//! Core version engine for vguard.
//!
//! This crate provides the layer callers talk to:
//! - [`VersionGuardian`], the facade over every operation
//! - Configuration management (multi-source, JSONC support)
//! - Backups of the working tree and rollback to snapshots
//! - Conflict detection between divergent versions of a file
//! - The append-only timeline and the analytics derived from it
//!
//! # Example
//!
//! ```no_run
//! use vguard_core::{GuardianConfig, VersionGuardian};
//!
//! # async fn example() -> vguard_core::GuardianResult<()> {
//! let guardian = VersionGuardian::open("/project/root", GuardianConfig::default())?;
//!
//! let before = guardian.create_snapshot("before-refactor", None).await?;
//! // ... an assistant edits files ...
//! let report = guardian
//!     .rollback(&before.id, guardian.rollback_options())
//!     .await?;
//! println!("restored {} files", report.written.len());
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod backup;
pub mod callback;
pub mod config;
pub mod conflict;
pub mod error;
pub mod guardian;
pub mod lock;
pub mod restore;
pub mod rollback;
pub mod timeline;

pub use analytics::{FileChangeStat, SizeSample, VersionAnalytics};
pub use backup::{Backup, BackupManager, BackupOptions};
pub use callback::{ConfirmationChoice, ConfirmationHandler, ProgressReporter};
pub use config::GuardianConfig;
pub use conflict::{Conflict, ConflictKind, ConflictResolution, ConflictResolver, SuggestionHint};
pub use error::{ConfigError, GuardianError, GuardianResult, RecordKind};
pub use guardian::{GuardianBuilder, RestoreOptions, VersionGuardian};
pub use lock::{MutationPermit, OperationGate};
pub use restore::{FileFailure, RestoreReport};
pub use rollback::{RollbackController, RollbackOptions};
pub use timeline::{TimelineEntry, TimelineKind, TimelineRecorder};

pub use vguard_snapshot::{
    Change, ChangeKind, CreateSnapshot, DiffChange, DiffResult, FileContent, Snapshot,
    SnapshotFile, SnapshotId, Version,
};
