//! Snapshot storage implementation.

use crate::{
    FileScanner, ProgressReporter, Snapshot, SnapshotError, SnapshotId, SnapshotMetadata,
    SnapshotResult,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vguard_storage::{JsonStorage, Storage, StorageError};
use vguard_util::Identifier;

/// Storage key prefix for snapshot records.
const SNAPSHOTS: &str = "snapshots";

/// Attempts at finding an unused identifier before giving up.
const MAX_ID_ATTEMPTS: usize = 3;

/// Parameters for a new snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSnapshot {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub vcs_commit: Option<String>,
    #[serde(default)]
    pub creator: Option<String>,
}

impl CreateSnapshot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_vcs_commit(mut self, commit: impl Into<String>) -> Self {
        self.vcs_commit = Some(commit.into());
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }
}

/// Limits applied by [`SnapshotStore::cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep at most this many snapshots (newest kept).
    pub max_snapshots: Option<usize>,
    /// Remove snapshots older than this many days.
    pub max_age_days: Option<u32>,
}

/// Persistent store of immutable snapshot records.
///
/// Each snapshot is one record under `snapshots/<id>` holding every file's
/// content. Records are written create-only and never modified afterwards.
pub struct SnapshotStore<S: Storage = JsonStorage> {
    storage: S,
    scanner: FileScanner,
}

impl SnapshotStore<JsonStorage> {
    /// Open a store rooted at `storage_dir`, scanning with `scanner`.
    pub fn open(storage_dir: impl Into<PathBuf>, scanner: FileScanner) -> Self {
        Self::new(JsonStorage::new(storage_dir), scanner)
    }
}

impl<S: Storage> SnapshotStore<S> {
    /// Create a store over an arbitrary backend.
    pub fn new(storage: S, scanner: FileScanner) -> Self {
        Self { storage, scanner }
    }

    /// The scanner snapshots are taken with.
    pub fn scanner(&self) -> &FileScanner {
        &self.scanner
    }

    /// Scan the working tree and persist it as a new snapshot.
    ///
    /// The record is durable when this returns. A cancelled scan persists
    /// nothing.
    pub async fn create(
        &self,
        request: CreateSnapshot,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressReporter>,
    ) -> SnapshotResult<Snapshot> {
        let report = self.scanner.scan(cancel, progress).await?;
        if cancel.is_cancelled() {
            return Err(SnapshotError::Cancelled);
        }

        let metadata = SnapshotMetadata {
            root: self.scanner.root().to_path_buf(),
            file_count: report.files.len(),
            total_size: report.total_size(),
            creator: request.creator,
            skipped: report.skipped,
        };

        let mut snapshot = Snapshot {
            id: SnapshotId::new(),
            name: request.name,
            description: request.description,
            created_at: Utc::now(),
            files: report.files,
            metadata,
            vcs_commit: request.vcs_commit,
            tags: request.tags,
        };

        let mut attempts = 0;
        loop {
            match self
                .storage
                .create(&[SNAPSHOTS, snapshot.id.as_str()], &snapshot)
                .await
            {
                Ok(()) => break,
                Err(StorageError::AlreadyExists(key)) if attempts + 1 < MAX_ID_ATTEMPTS => {
                    warn!(key = %key, "Snapshot id already taken, regenerating");
                    snapshot.id = SnapshotId::new();
                    attempts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            snapshot_id = %snapshot.id,
            name = %snapshot.name,
            files = snapshot.files.len(),
            skipped = snapshot.metadata.skipped.len(),
            total_size = snapshot.metadata.total_size,
            "Created snapshot"
        );

        Ok(snapshot)
    }

    /// Get a snapshot by ID.
    ///
    /// Every file's hash is checked against its content; a mismatch is
    /// reported as [`SnapshotError::Corrupted`].
    pub async fn get(&self, snapshot_id: &SnapshotId) -> SnapshotResult<Snapshot> {
        let snapshot = self.load(snapshot_id).await?;

        if snapshot.id != *snapshot_id {
            return Err(SnapshotError::corrupted(
                snapshot_id.as_str(),
                format!("record holds snapshot {}", snapshot.id),
            ));
        }
        if let Some(file) = snapshot.files.iter().find(|f| !f.verify()) {
            return Err(SnapshotError::corrupted(
                snapshot_id.as_str(),
                format!("content of {} does not match its hash", file.path),
            ));
        }

        Ok(snapshot)
    }

    async fn load(&self, snapshot_id: &SnapshotId) -> SnapshotResult<Snapshot> {
        if !Identifier::is_valid(snapshot_id.as_str()) {
            return Err(SnapshotError::not_found(snapshot_id.as_str()));
        }

        self.storage
            .read(&[SNAPSHOTS, snapshot_id.as_str()])
            .await?
            .ok_or_else(|| SnapshotError::not_found(snapshot_id.as_str()))
    }

    /// List all snapshots, newest first.
    ///
    /// A record that fails to decode fails the listing with its id.
    pub async fn list(&self) -> SnapshotResult<Vec<Snapshot>> {
        let ids = self.storage.list(&[SNAPSHOTS]).await?;
        let mut snapshots = Vec::with_capacity(ids.len());

        for id in ids {
            match self.storage.read::<Snapshot>(&[SNAPSHOTS, id.as_str()]).await? {
                Some(snapshot) => snapshots.push(snapshot),
                // Removed between listing and reading.
                None => debug!(snapshot_id = %id, "Snapshot vanished while listing"),
            }
        }

        // Sort by timestamp (newest first)
        snapshots.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(snapshots)
    }

    /// The most recent snapshot, if any.
    pub async fn latest(&self) -> SnapshotResult<Option<Snapshot>> {
        Ok(self.list().await?.into_iter().next())
    }

    /// List snapshots carrying `tag`, newest first.
    pub async fn find_by_tag(&self, tag: &str) -> SnapshotResult<Vec<Snapshot>> {
        let all = self.list().await?;
        Ok(all.into_iter().filter(|s| s.has_tag(tag)).collect())
    }

    /// Delete a snapshot.
    pub async fn delete(&self, snapshot_id: &SnapshotId) -> SnapshotResult<()> {
        if !Identifier::is_valid(snapshot_id.as_str())
            || !self.storage.remove(&[SNAPSHOTS, snapshot_id.as_str()]).await?
        {
            return Err(SnapshotError::not_found(snapshot_id.as_str()));
        }

        info!(snapshot_id = %snapshot_id, "Deleted snapshot");
        Ok(())
    }

    /// Remove snapshots beyond the retention limits.
    ///
    /// Returns the ids that were deleted.
    pub async fn cleanup(&self, policy: RetentionPolicy) -> SnapshotResult<Vec<SnapshotId>> {
        let cutoff = policy
            .max_age_days
            .map(|days| Utc::now() - Duration::days(i64::from(days)));

        let snapshots = self.list().await?;
        let mut deleted = Vec::new();

        for (idx, snapshot) in snapshots.iter().enumerate() {
            let too_many = policy.max_snapshots.is_some_and(|max| idx >= max);
            let too_old = cutoff.is_some_and(|cutoff| snapshot.created_at < cutoff);
            if !(too_many || too_old) {
                continue;
            }

            match self.delete(&snapshot.id).await {
                Ok(()) => deleted.push(snapshot.id.clone()),
                Err(SnapshotError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if !deleted.is_empty() {
            info!(count = deleted.len(), "Cleaned up snapshots");
        }

        Ok(deleted)
    }
}
