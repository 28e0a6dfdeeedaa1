//! Restoring the working tree to a snapshot.

use crate::backup::{BackupManager, BackupOptions};
use crate::error::GuardianResult;
use crate::restore::{write_file, FileFailure, RestoreReport, WriteOutcome};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vguard_snapshot::{Snapshot, SnapshotFile, SnapshotId, SnapshotStore};
use vguard_storage::Storage;
use vguard_util::TimingGuard;

/// Name given to the safety backup taken before a rollback.
pub const PRE_ROLLBACK_BACKUP: &str = "pre-rollback";

/// Options for [`RollbackController::rollback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackOptions {
    /// Take a backup of the current tree before touching anything.
    pub backup: bool,
    /// Delete files the target snapshot does not contain.
    pub delete_untracked: bool,
    /// Stop writing once this much time has passed.
    pub timeout: Option<Duration>,
}

impl Default for RollbackOptions {
    fn default() -> Self {
        Self {
            backup: true,
            delete_untracked: true,
            timeout: None,
        }
    }
}

/// Orchestrates backup, deletion and writes for a rollback.
pub struct RollbackController<'a, S: Storage> {
    store: &'a SnapshotStore<S>,
    backups: &'a BackupManager,
    compress_backup: bool,
}

impl<'a, S: Storage> RollbackController<'a, S> {
    pub fn new(store: &'a SnapshotStore<S>, backups: &'a BackupManager) -> Self {
        Self {
            store,
            backups,
            compress_backup: false,
        }
    }

    /// Compress the safety backup.
    pub fn with_compressed_backup(mut self, compress: bool) -> Self {
        self.compress_backup = compress;
        self
    }

    /// Restore the working tree to `snapshot_id`.
    ///
    /// The target is loaded before anything else, so an unknown id fails
    /// without creating a backup or touching a file. Once deletion starts the
    /// rollback runs to completion; only the timeout can stop it early, and
    /// files already written stay written.
    pub async fn rollback(
        &self,
        snapshot_id: &SnapshotId,
        options: RollbackOptions,
    ) -> GuardianResult<RestoreReport> {
        let target = self.store.get(snapshot_id).await?;
        let _timing = TimingGuard::rollback(snapshot_id.as_str());
        let deadline = options.timeout.map(|t| Instant::now() + t);

        let backup_id = if options.backup {
            let backup = self
                .backups
                .create(
                    Some(PRE_ROLLBACK_BACKUP.to_string()),
                    &BackupOptions {
                        compress: self.compress_backup,
                        ..Default::default()
                    },
                    None,
                )
                .await?;
            Some(backup.id)
        } else {
            None
        };

        let mut report = RestoreReport::new(snapshot_id.as_str());
        report.backup_id = backup_id;

        if options.delete_untracked {
            self.delete_untracked(&target, &mut report).await?;
        }
        self.write_target(&target, deadline, &mut report).await;

        info!(
            snapshot_id = %snapshot_id,
            backup_id = ?report.backup_id,
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            timed_out = report.timed_out,
            "Rolled back to snapshot"
        );
        Ok(report)
    }

    async fn delete_untracked(
        &self,
        target: &Snapshot,
        report: &mut RestoreReport,
    ) -> GuardianResult<()> {
        let scanner = self.store.scanner();
        let tracked = target.file_index();
        let current = scanner.enumerate(&CancellationToken::new())?;

        let mut parents = BTreeSet::new();
        for key in current.paths {
            if tracked.contains_key(key.as_str()) {
                continue;
            }
            let path = scanner.root().join(&key);
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %key, "Deleted untracked file");
                    if let Some(parent) = path.parent() {
                        parents.insert(parent.to_path_buf());
                    }
                    report.deleted.push(key);
                }
                Err(e) => {
                    warn!(path = %key, error = %e, "Failed to delete untracked file");
                    report.failed.push(FileFailure::new(key, e));
                }
            }
        }

        // Deepest first so nested empty directories collapse upwards.
        for dir in parents.into_iter().rev() {
            prune_empty_dirs(scanner.root(), &dir).await;
        }
        Ok(())
    }

    async fn write_target(
        &self,
        target: &Snapshot,
        deadline: Option<Instant>,
        report: &mut RestoreReport,
    ) {
        let scanner = self.store.scanner();
        let mut files = target.files.iter();

        while let Some(file) = files.next() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(snapshot_id = %target.id, "Rollback timed out");
                report.timed_out = true;
                report.not_processed.push(file.path.clone());
                report
                    .not_processed
                    .extend(files.by_ref().map(|f| f.path.clone()));
                break;
            }

            match restore_file(scanner.root(), scanner.resolve(&file.path).as_deref(), file).await {
                Ok(WriteOutcome::Written) => {
                    debug!(path = %file.path, "Restored file");
                    report.written.push(file.path.clone());
                }
                Ok(WriteOutcome::Unchanged) => report.unchanged.push(file.path.clone()),
                Err(error) => {
                    warn!(path = %file.path, error = %error, "Failed to restore file");
                    report.failed.push(FileFailure::new(file.path.clone(), error));
                }
            }
        }
    }
}

async fn restore_file(
    root: &Path,
    target: Option<&Path>,
    file: &SnapshotFile,
) -> Result<WriteOutcome, String> {
    let target = target.ok_or_else(|| "path escapes the project root".to_string())?;
    let bytes = file
        .content
        .to_bytes()
        .ok_or_else(|| "stored content is not valid base64".to_string())?;
    write_file(root, target, &bytes, &file.hash)
        .await
        .map_err(|e| e.to_string())
}

/// Remove `dir` and its ancestors while they are empty, stopping at `root`.
async fn prune_empty_dirs(root: &Path, dir: &Path) {
    let mut current = dir.to_path_buf();
    while current != root && current.starts_with(root) {
        // Fails on a non-empty directory, which ends the walk.
        if fs::remove_dir(&current).await.is_err() {
            break;
        }
        debug!(path = %current.display(), "Removed empty directory");
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}
