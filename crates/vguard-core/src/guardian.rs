//! The version engine facade.
//!
//! [`VersionGuardian`] is the only entry point callers need. It wires the
//! snapshot store, backup manager, rollback controller, conflict resolver
//! and timeline together for one project, and enforces the concurrency
//! policy: mutating operations run one at a time and a second one is
//! rejected, while reads share access but wait out any mutation.

use crate::analytics::{self, VersionAnalytics};
use crate::backup::{Backup, BackupManager, BackupOptions};
use crate::callback::{ConfirmationHandler, ProgressReporter};
use crate::config::GuardianConfig;
use crate::conflict::{Conflict, ConflictResolution, ConflictResolver, SuggestionHint};
use crate::error::{GuardianError, GuardianResult};
use crate::lock::OperationGate;
use crate::restore::RestoreReport;
use crate::rollback::{RollbackController, RollbackOptions};
use crate::timeline::{
    TimelineEntry, TimelineKind, TimelineRecorder, BACKUP_CREATED, BACKUP_RESTORED,
    CONFLICT_RESOLVED, ROLLBACK_PERFORMED, SNAPSHOT_CREATED,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vguard_snapshot::{
    CreateSnapshot, DiffEngine, DiffResult, FileScanner, IgnorePredicate, IgnoreRules, Snapshot,
    SnapshotId, SnapshotStore, Version,
};
use vguard_storage::{JsonStorage, Storage};

/// Options for [`VersionGuardian::restore_backup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Stop writing once this much time has passed.
    pub timeout: Option<Duration>,
}

/// Configures and opens a [`VersionGuardian`].
pub struct GuardianBuilder {
    root: PathBuf,
    config: GuardianConfig,
    predicate: Option<IgnorePredicate>,
    progress: Option<Arc<dyn ProgressReporter>>,
    confirmation: Option<Arc<dyn ConfirmationHandler>>,
}

impl GuardianBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: GuardianConfig::default(),
            predicate: None,
            progress: None,
            confirmation: None,
        }
    }

    pub fn config(mut self, config: GuardianConfig) -> Self {
        self.config = config;
        self
    }

    /// Extra ignore rule on top of the configured patterns.
    pub fn ignore<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Called with `(files_processed, total_files)` during scans and backups.
    pub fn progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Asked to settle conflicts whose resolution is below the threshold.
    pub fn confirmation(mut self, handler: Arc<dyn ConfirmationHandler>) -> Self {
        self.confirmation = Some(handler);
        self
    }

    /// Open with snapshots stored as JSON files in the storage directory.
    pub fn build(self) -> GuardianResult<VersionGuardian<JsonStorage>> {
        let storage = JsonStorage::new(self.config.storage_dir(&self.root));
        self.build_with_storage(storage)
    }

    /// Open with a custom snapshot storage backend.
    ///
    /// Backups and the history log still live in the storage directory.
    pub fn build_with_storage<S: Storage>(self, storage: S) -> GuardianResult<VersionGuardian<S>> {
        let storage_dir = self.config.storage_dir(&self.root);

        let mut rules = IgnoreRules::new(self.config.ignore_patterns())?
            .with_gitignore(self.config.respect_gitignore());
        if let Some(predicate) = self.predicate {
            rules = rules.with_predicate(move |path| predicate(path));
        }
        let scanner = FileScanner::new(&self.root, rules).exclude(&storage_dir);

        info!(
            root = %self.root.display(),
            storage_dir = %storage_dir.display(),
            "Opened version guardian"
        );

        Ok(VersionGuardian {
            backups: BackupManager::new(&storage_dir, scanner.clone()),
            store: SnapshotStore::new(storage, scanner),
            timeline: TimelineRecorder::new(&storage_dir),
            resolver: ConflictResolver::new(self.config.conflict_threshold()),
            gate: OperationGate::new(),
            progress: self.progress,
            confirmation: self.confirmation,
            root: self.root,
            storage_dir,
            config: self.config,
        })
    }
}

/// Snapshot, backup, rollback, diff and conflict operations for one project.
pub struct VersionGuardian<S: Storage = JsonStorage> {
    root: PathBuf,
    storage_dir: PathBuf,
    config: GuardianConfig,
    store: SnapshotStore<S>,
    backups: BackupManager,
    timeline: TimelineRecorder,
    resolver: ConflictResolver,
    gate: OperationGate,
    progress: Option<Arc<dyn ProgressReporter>>,
    confirmation: Option<Arc<dyn ConfirmationHandler>>,
}

impl VersionGuardian<JsonStorage> {
    /// Open a project with the given configuration.
    pub fn open(root: impl Into<PathBuf>, config: GuardianConfig) -> GuardianResult<Self> {
        GuardianBuilder::new(root).config(config).build()
    }

    /// Open a project with configuration loaded from the usual sources.
    pub async fn load(root: impl Into<PathBuf>) -> GuardianResult<Self> {
        let root = root.into();
        let (config, _) = GuardianConfig::load(Some(&root)).await?;
        Self::open(root, config)
    }

    pub fn builder(root: impl Into<PathBuf>) -> GuardianBuilder {
        GuardianBuilder::new(root)
    }
}

impl<S: Storage> VersionGuardian<S> {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    /// Name of the mutating operation in progress, if any.
    pub fn in_flight(&self) -> Option<&'static str> {
        self.gate.in_flight()
    }

    // Snapshots

    /// Capture the working tree as a new snapshot.
    pub async fn create_snapshot(
        &self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> GuardianResult<Snapshot> {
        let mut request = CreateSnapshot::new(name);
        request.description = description;
        self.create_snapshot_with(request, &CancellationToken::new())
            .await
    }

    /// Capture the working tree with tags, a VCS reference or a creator,
    /// and a cancellation signal checked between files.
    pub async fn create_snapshot_with(
        &self,
        request: CreateSnapshot,
        cancel: &CancellationToken,
    ) -> GuardianResult<Snapshot> {
        let _permit = self.gate.begin_mutation("create snapshot").await?;

        let previous = self.store.latest().await?;
        let snapshot = self
            .store
            .create(request, cancel, self.progress.as_deref())
            .await?;

        let changed = Version::between(previous.as_ref(), &snapshot)
            .paths()
            .map(String::from)
            .collect();
        self.timeline
            .append(
                &TimelineEntry::new(
                    SNAPSHOT_CREATED,
                    TimelineKind::Snapshot,
                    format!("Created snapshot '{}'", snapshot.name),
                )
                .with_target(snapshot.id.as_str())
                .with_files(changed),
            )
            .await?;

        Ok(snapshot)
    }

    /// All snapshots, newest first.
    pub async fn list_snapshots(&self) -> GuardianResult<Vec<Snapshot>> {
        let _read = self.gate.begin_read().await;
        Ok(self.store.list().await?)
    }

    pub async fn get_snapshot(&self, id: &SnapshotId) -> GuardianResult<Snapshot> {
        let _read = self.gate.begin_read().await;
        Ok(self.store.get(id).await?)
    }

    /// Snapshots carrying `tag`, newest first.
    pub async fn find_by_tag(&self, tag: &str) -> GuardianResult<Vec<Snapshot>> {
        let _read = self.gate.begin_read().await;
        Ok(self.store.find_by_tag(tag).await?)
    }

    /// Remove a snapshot record.
    pub async fn delete_snapshot(&self, id: &SnapshotId) -> GuardianResult<()> {
        let _permit = self.gate.begin_mutation("delete snapshot").await?;
        Ok(self.store.delete(id).await?)
    }

    /// Apply the configured retention policy. Returns the removed ids.
    pub async fn cleanup_snapshots(&self) -> GuardianResult<Vec<SnapshotId>> {
        let _permit = self.gate.begin_mutation("clean up snapshots").await?;
        Ok(self.store.cleanup(self.config.retention_policy()).await?)
    }

    /// The changes `id` made relative to the snapshot taken before it.
    pub async fn version(&self, id: &SnapshotId) -> GuardianResult<Version> {
        let _read = self.gate.begin_read().await;
        let snapshots = self.store.list().await?;
        let position = snapshots
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| GuardianError::snapshot_not_found(id.as_str()))?;
        // Newest first, so the predecessor is the next entry.
        Ok(Version::between(snapshots.get(position + 1), &snapshots[position]))
    }

    // Rollback

    /// Rollback options with the configured defaults.
    pub fn rollback_options(&self) -> RollbackOptions {
        RollbackOptions {
            backup: self.config.rollback_backup(),
            delete_untracked: self.config.rollback_delete_untracked(),
            timeout: None,
        }
    }

    /// Restore the working tree to a snapshot.
    pub async fn rollback(
        &self,
        id: &SnapshotId,
        options: RollbackOptions,
    ) -> GuardianResult<RestoreReport> {
        let _permit = self.gate.begin_mutation("rollback").await?;

        let report = RollbackController::new(&self.store, &self.backups)
            .with_compressed_backup(self.config.backup_compress())
            .rollback(id, options)
            .await?;

        if let Some(backup_id) = &report.backup_id {
            self.timeline
                .append(
                    &TimelineEntry::new(
                        BACKUP_CREATED,
                        TimelineKind::Backup,
                        format!("Created backup before rolling back to {id}"),
                    )
                    .with_target(backup_id.as_str()),
                )
                .await?;
        }
        self.timeline
            .append(
                &TimelineEntry::new(
                    ROLLBACK_PERFORMED,
                    TimelineKind::Rollback,
                    format!(
                        "Rolled back to {id}: {} written, {} deleted, {} failed",
                        report.written.len(),
                        report.deleted.len(),
                        report.failed.len()
                    ),
                )
                .with_target(id.as_str())
                .with_files(report.changed_paths()),
            )
            .await?;

        Ok(report)
    }

    // Diffs

    /// Line-level differences between two snapshots.
    pub async fn diff(&self, old: &SnapshotId, new: &SnapshotId) -> GuardianResult<Vec<DiffResult>> {
        let _read = self.gate.begin_read().await;
        let old = self.store.get(old).await?;
        let new = self.store.get(new).await?;
        Ok(DiffEngine::diff_snapshots(&old, &new))
    }

    pub fn diff_files(&self, old: &str, new: &str) -> DiffResult {
        DiffEngine::diff_files(old, new)
    }

    // Backups

    /// Backup options with the configured defaults.
    pub fn backup_options(&self) -> BackupOptions {
        BackupOptions {
            compress: self.config.backup_compress(),
            ..Default::default()
        }
    }

    /// Copy the current working tree into a new backup.
    pub async fn create_backup(
        &self,
        name: Option<String>,
        options: BackupOptions,
    ) -> GuardianResult<Backup> {
        let _permit = self.gate.begin_mutation("create backup").await?;

        let backup = self
            .backups
            .create(name, &options, self.progress.as_deref())
            .await?;
        self.timeline
            .append(
                &TimelineEntry::new(
                    BACKUP_CREATED,
                    TimelineKind::Backup,
                    format!("Created backup '{}'", backup.name),
                )
                .with_target(backup.id.as_str()),
            )
            .await?;

        Ok(backup)
    }

    /// Write a backup's files back into the working tree.
    pub async fn restore_backup(
        &self,
        id: &str,
        options: RestoreOptions,
    ) -> GuardianResult<RestoreReport> {
        let _permit = self.gate.begin_mutation("restore backup").await?;

        let deadline = options.timeout.map(|t| Instant::now() + t);
        let report = self.backups.restore(id, deadline).await?;
        self.timeline
            .append(
                &TimelineEntry::new(
                    BACKUP_RESTORED,
                    TimelineKind::Backup,
                    format!(
                        "Restored backup {id}: {} written, {} failed",
                        report.written.len(),
                        report.failed.len()
                    ),
                )
                .with_target(id)
                .with_files(report.changed_paths()),
            )
            .await?;

        Ok(report)
    }

    /// All backups, newest first.
    pub async fn list_backups(&self) -> GuardianResult<Vec<Backup>> {
        let _read = self.gate.begin_read().await;
        self.backups.list().await
    }

    pub async fn get_backup(&self, id: &str) -> GuardianResult<Backup> {
        let _read = self.gate.begin_read().await;
        self.backups.get(id).await
    }

    pub async fn delete_backup(&self, id: &str) -> GuardianResult<()> {
        let _permit = self.gate.begin_mutation("delete backup").await?;
        self.backups.delete(id).await
    }

    // Conflicts

    /// Overlapping edits between two versions of a file.
    pub fn detect_conflicts(&self, ancestor: &str, current: &str, incoming: &str) -> Vec<Conflict> {
        self.resolver.detect(ancestor, current, incoming)
    }

    /// Propose a resolution and settle it.
    ///
    /// Below the configured threshold the confirmation handler decides; with
    /// no handler the conflicts come back as
    /// [`GuardianError::ConflictUnresolved`].
    pub async fn resolve_conflicts(
        &self,
        path: &str,
        conflicts: Vec<Conflict>,
        hint: Option<SuggestionHint>,
    ) -> GuardianResult<ConflictResolution> {
        let proposed = self.resolver.resolve(path, conflicts, hint);
        let resolution = self
            .resolver
            .confirm(proposed, self.confirmation.as_deref())?;

        self.timeline
            .append(
                &TimelineEntry::new(
                    CONFLICT_RESOLVED,
                    TimelineKind::Version,
                    format!(
                        "Resolved {} conflict(s) in {path} (confidence {:.2})",
                        resolution.conflicts.len(),
                        resolution.confidence
                    ),
                )
                .with_files(vec![path.to_string()]),
            )
            .await?;

        Ok(resolution)
    }

    // History

    /// The most recent `limit` timeline entries in the order they happened,
    /// or the whole log.
    pub async fn get_history(&self, limit: Option<usize>) -> GuardianResult<Vec<TimelineEntry>> {
        let _read = self.gate.begin_read().await;
        self.timeline.recent(limit).await
    }

    /// Statistics recomputed from the snapshot store and the timeline.
    pub async fn get_analytics(&self) -> GuardianResult<VersionAnalytics> {
        let _read = self.gate.begin_read().await;
        let snapshots = self.store.list().await?;
        let timeline = self.timeline.entries().await?;
        Ok(analytics::compute(&snapshots, timeline, self.config.top_files()))
    }
}
