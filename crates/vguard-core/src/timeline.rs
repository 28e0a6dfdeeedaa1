//! Append-only event log.
//!
//! Every successful mutating operation appends one JSON line to
//! `history.log`. Lines are never rewritten or reordered; the log is the
//! only input to analytics besides the snapshot store.

use crate::error::{GuardianError, GuardianResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// File name of the log inside the storage directory.
pub const HISTORY_FILE: &str = "history.log";

pub const SNAPSHOT_CREATED: &str = "snapshot.created";
pub const BACKUP_CREATED: &str = "backup.created";
pub const BACKUP_RESTORED: &str = "backup.restored";
pub const ROLLBACK_PERFORMED: &str = "rollback.performed";
pub const CONFLICT_RESOLVED: &str = "conflict.resolved";

/// Category of a timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineKind {
    Snapshot,
    Version,
    Backup,
    Rollback,
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp: DateTime<Utc>,
    /// Dotted event name, e.g. `snapshot.created`.
    pub event: String,
    pub kind: TimelineKind,
    pub description: String,
    /// Snapshot or backup the event concerns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Files the event changed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl TimelineEntry {
    pub fn new(event: &str, kind: TimelineKind, description: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.to_string(),
            kind,
            description: description.into(),
            target_id: None,
            files: Vec::new(),
        }
    }

    pub fn with_target(mut self, id: impl Into<String>) -> Self {
        self.target_id = Some(id.into());
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }
}

/// Writes and reads the event log.
#[derive(Debug)]
pub struct TimelineRecorder {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TimelineRecorder {
    /// Recorder for the log in `storage_dir`.
    pub fn new(storage_dir: &Path) -> Self {
        Self {
            path: storage_dir.join(HISTORY_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry. The entry is on disk when this returns.
    pub async fn append(&self, entry: &TimelineEntry) -> GuardianResult<()> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| GuardianError::validation(&entry.event, e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;

        debug!(event = %entry.event, target = ?entry.target_id, "Appended timeline entry");
        Ok(())
    }

    /// All entries in the order they were written.
    ///
    /// A line that does not decode fails the read with its line number.
    pub async fn entries(&self) -> GuardianResult<Vec<TimelineEntry>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                return Err(GuardianError::validation(HISTORY_FILE, e.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line).map_err(|e| {
                    GuardianError::validation(format!("{HISTORY_FILE}:{}", idx + 1), e.to_string())
                })
            })
            .collect()
    }

    /// The most recent `limit` entries in chronological order, or all of them.
    pub async fn recent(&self, limit: Option<usize>) -> GuardianResult<Vec<TimelineEntry>> {
        let mut entries = self.entries().await?;
        if let Some(limit) = limit {
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_read_in_order() {
        let dir = TempDir::new().unwrap();
        let timeline = TimelineRecorder::new(dir.path());

        for i in 0..3 {
            timeline
                .append(
                    &TimelineEntry::new(SNAPSHOT_CREATED, TimelineKind::Snapshot, format!("s{i}"))
                        .with_target(format!("snp_{i}"))
                        .with_files(vec!["a.txt".into()]),
                )
                .await
                .unwrap();
        }

        let entries = timeline.entries().await.unwrap();
        let descriptions: Vec<_> = entries.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(descriptions, vec!["s0", "s1", "s2"]);
        assert_eq!(entries[1].target_id.as_deref(), Some("snp_1"));
    }

    #[tokio::test]
    async fn test_missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let timeline = TimelineRecorder::new(&dir.path().join("nested"));
        assert!(timeline.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_keeps_latest_in_order() {
        let dir = TempDir::new().unwrap();
        let timeline = TimelineRecorder::new(dir.path());
        for i in 0..5 {
            timeline
                .append(&TimelineEntry::new(
                    BACKUP_CREATED,
                    TimelineKind::Backup,
                    i.to_string(),
                ))
                .await
                .unwrap();
        }

        let recent = timeline.recent(Some(2)).await.unwrap();
        let descriptions: Vec<_> = recent.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(descriptions, vec!["3", "4"]);
        assert_eq!(timeline.recent(None).await.unwrap().len(), 5);
        assert_eq!(timeline.recent(Some(50)).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_corrupt_line_names_its_position() {
        let dir = TempDir::new().unwrap();
        let timeline = TimelineRecorder::new(dir.path());
        timeline
            .append(&TimelineEntry::new(
                ROLLBACK_PERFORMED,
                TimelineKind::Rollback,
                "ok",
            ))
            .await
            .unwrap();
        let mut raw = std::fs::read_to_string(timeline.path()).unwrap();
        raw.push_str("not json\n");
        std::fs::write(timeline.path(), raw).unwrap();

        match timeline.entries().await.unwrap_err() {
            GuardianError::Validation { id, .. } => assert_eq!(id, "history.log:2"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
