//! Versions: the file-level changes a snapshot introduced.

use crate::{FileContent, Snapshot, SnapshotId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use vguard_util::{IdPrefix, Identifier};

/// What happened to a file, with the content on each side that exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChangeKind {
    Added { new: FileContent },
    Modified { previous: FileContent, new: FileContent },
    Deleted { previous: FileContent },
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Modified { .. } => "modified",
            Self::Deleted { .. } => "deleted",
        }
    }
}

/// A change to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    #[serde(flatten)]
    pub kind: ChangeKind,
    pub timestamp: DateTime<Utc>,
}

impl Change {
    /// Content before the change; absent for added files.
    pub fn previous(&self) -> Option<&FileContent> {
        match &self.kind {
            ChangeKind::Added { .. } => None,
            ChangeKind::Modified { previous, .. } | ChangeKind::Deleted { previous } => {
                Some(previous)
            }
        }
    }

    /// Content after the change; absent for deleted files.
    pub fn new_content(&self) -> Option<&FileContent> {
        match &self.kind {
            ChangeKind::Added { new } | ChangeKind::Modified { new, .. } => Some(new),
            ChangeKind::Deleted { .. } => None,
        }
    }
}

/// The set of changes between a snapshot and the one before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// Ordered by path.
    pub changes: Vec<Change>,
    pub snapshot_id: SnapshotId,
}

impl Version {
    /// Derive the version `current` forms relative to `previous`.
    ///
    /// With no previous snapshot every file counts as added. The version id
    /// shares the snapshot's ULID, so deriving it twice yields the same id.
    pub fn between(previous: Option<&Snapshot>, current: &Snapshot) -> Self {
        let timestamp = current.created_at;
        let before = previous.map(|s| s.file_index()).unwrap_or_default();
        let after = current.file_index();

        let paths: BTreeSet<&str> = before.keys().chain(after.keys()).copied().collect();
        let changes = paths
            .into_iter()
            .filter_map(|path| {
                let kind = match (before.get(path), after.get(path)) {
                    (None, Some(new)) => ChangeKind::Added {
                        new: new.content.clone(),
                    },
                    (Some(old), None) => ChangeKind::Deleted {
                        previous: old.content.clone(),
                    },
                    (Some(old), Some(new)) if old.hash != new.hash => ChangeKind::Modified {
                        previous: old.content.clone(),
                        new: new.content.clone(),
                    },
                    _ => return None,
                };
                Some(Change {
                    path: path.to_string(),
                    kind,
                    timestamp,
                })
            })
            .collect();

        let id = match Identifier::parse(current.id.as_str()) {
            Some((_, ulid)) => Identifier::with_ulid(IdPrefix::Version, ulid),
            None => Identifier::version(),
        };

        Self {
            id,
            name: current.name.clone(),
            timestamp,
            changes,
            snapshot_id: current.id.clone(),
        }
    }

    /// Paths touched by this version.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.path.as_str())
    }
}
