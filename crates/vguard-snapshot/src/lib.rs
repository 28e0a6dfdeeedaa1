//! Snapshots of a project tree for vguard.
//!
//! This crate provides the data layer of the version engine:
//! - [`FileScanner`] walks the working tree and hashes every file
//! - [`SnapshotStore`] persists immutable snapshot records
//! - [`DiffEngine`] computes line-level diffs between contents and snapshots
//! - [`Version`] derives added/modified/deleted changes between snapshots
//!
//! # Example
//!
//! ```no_run
//! use vguard_snapshot::{CreateSnapshot, FileScanner, IgnoreRules, SnapshotStore};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scanner = FileScanner::new("/project/root", IgnoreRules::new(["target/**"])?)
//!     .exclude("/project/root/.vguard");
//! let store = SnapshotStore::open("/project/root/.vguard", scanner);
//!
//! // Take a snapshot before editing
//! let snapshot = store
//!     .create(CreateSnapshot::new("before-refactor"), &CancellationToken::new(), None)
//!     .await?;
//!
//! // ... edit files, take another snapshot, compare them ...
//! let later = store
//!     .create(CreateSnapshot::new("after-refactor"), &CancellationToken::new(), None)
//!     .await?;
//! for diff in vguard_snapshot::DiffEngine::diff_snapshots(&snapshot, &later) {
//!     println!("{}", diff.summary());
//! }
//! # Ok(())
//! # }
//! ```

mod diff;
mod error;
mod scanner;
mod snapshot;
mod store;
mod version;

pub use diff::{DiffChange, DiffEngine, DiffResult, Hunk};
pub use error::{SnapshotError, SnapshotResult};
pub use scanner::{
    Enumeration, FileScanner, IgnorePredicate, IgnoreRules, ProgressReporter, ScanReport,
};
pub use snapshot::{FileContent, SkippedFile, Snapshot, SnapshotFile, SnapshotId, SnapshotMetadata};
pub use store::{CreateSnapshot, RetentionPolicy, SnapshotStore};
pub use version::{Change, ChangeKind, Version};
