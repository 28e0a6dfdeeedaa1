//! Statistics derived from the snapshot store and the timeline.
//!
//! Nothing here is persisted. [`compute`] is a pure function of its inputs,
//! so the same store and log always produce the same analytics.

use crate::timeline::{TimelineEntry, BACKUP_CREATED};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use vguard_snapshot::{Snapshot, Version};

/// How often a file shows up in the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChangeStat {
    pub path: String,
    /// Number of timeline entries that list this file.
    pub change_count: usize,
    /// Timestamp of the latest such entry.
    pub last_modified: DateTime<Utc>,
}

/// Project size at the time a snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeSample {
    pub timestamp: DateTime<Utc>,
    pub total_size: u64,
    pub file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionAnalytics {
    pub total_versions: usize,
    pub total_snapshots: usize,
    /// Backups ever created, read from the timeline. Deleting a backup does
    /// not lower it; [`VersionGuardian::list_backups`] gives the live count.
    ///
    /// [`VersionGuardian::list_backups`]: crate::VersionGuardian::list_backups
    pub total_backups: usize,
    pub average_changes_per_version: f64,
    /// Most frequently changed files, busiest first.
    pub most_changed: Vec<FileChangeStat>,
    pub timeline: Vec<TimelineEntry>,
    /// One sample per snapshot, oldest first.
    pub size_growth: Vec<SizeSample>,
}

/// Aggregate `snapshots` (any order) and the full `timeline`.
pub fn compute(
    snapshots: &[Snapshot],
    timeline: Vec<TimelineEntry>,
    top_files: usize,
) -> VersionAnalytics {
    let mut chronological: Vec<&Snapshot> = snapshots.iter().collect();
    chronological.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut total_changes = 0usize;
    let mut previous = None;
    for snapshot in &chronological {
        total_changes += Version::between(previous, snapshot).changes.len();
        previous = Some(*snapshot);
    }

    let total_versions = chronological.len();
    let average_changes_per_version = if total_versions == 0 {
        0.0
    } else {
        total_changes as f64 / total_versions as f64
    };

    let size_growth = chronological
        .iter()
        .map(|s| SizeSample {
            timestamp: s.created_at,
            total_size: s.metadata.total_size,
            file_count: s.metadata.file_count,
        })
        .collect();

    VersionAnalytics {
        total_versions,
        total_snapshots: snapshots.len(),
        total_backups: timeline.iter().filter(|e| e.event == BACKUP_CREATED).count(),
        average_changes_per_version,
        most_changed: most_changed(&timeline, top_files),
        timeline,
        size_growth,
    }
}

fn most_changed(timeline: &[TimelineEntry], limit: usize) -> Vec<FileChangeStat> {
    let mut stats: HashMap<&str, FileChangeStat> = HashMap::new();
    for entry in timeline {
        for path in &entry.files {
            let stat = stats.entry(path.as_str()).or_insert_with(|| FileChangeStat {
                path: path.clone(),
                change_count: 0,
                last_modified: entry.timestamp,
            });
            stat.change_count += 1;
            stat.last_modified = stat.last_modified.max(entry.timestamp);
        }
    }

    let mut ranked: Vec<FileChangeStat> = stats.into_values().collect();
    ranked.sort_by(|a, b| {
        b.change_count
            .cmp(&a.change_count)
            .then_with(|| a.path.cmp(&b.path))
    });
    ranked.truncate(limit);
    ranked
}
