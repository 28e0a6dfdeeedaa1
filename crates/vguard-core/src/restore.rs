//! Per-file outcome reporting and safe writes into the working tree.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use vguard_util::{content_hash, path::is_within};

/// A file an operation could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

impl FileFailure {
    pub fn new(path: impl Into<String>, error: impl ToString) -> Self {
        Self {
            path: path.into(),
            error: error.to_string(),
        }
    }
}

/// Outcome of a rollback or backup restore.
///
/// Every path the operation considered lands in exactly one of `written`,
/// `unchanged`, `deleted`, `failed` or `not_processed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Snapshot or backup that was restored.
    pub target_id: String,
    /// Safety backup taken before any file was touched.
    pub backup_id: Option<String>,
    /// Files rewritten with the target content.
    pub written: Vec<String>,
    /// Files that already had the target content.
    pub unchanged: Vec<String>,
    /// Files removed because the target does not contain them.
    pub deleted: Vec<String>,
    pub failed: Vec<FileFailure>,
    /// Files not reached before the timeout.
    pub not_processed: Vec<String>,
    pub timed_out: bool,
}

impl RestoreReport {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            ..Self::default()
        }
    }

    /// Number of paths handled successfully.
    pub fn succeeded(&self) -> usize {
        self.written.len() + self.unchanged.len() + self.deleted.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// No failures and no timeout.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.timed_out
    }

    /// Paths whose content on disk changed.
    pub fn changed_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .written
            .iter()
            .chain(self.deleted.iter())
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

/// What [`write_file`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Written,
    Unchanged,
}

/// Write `bytes` to `target` inside `root`.
///
/// Parent directories are created as needed. A symlink at the target is
/// replaced rather than followed, and a parent that resolves outside the
/// root is refused. Identical content is left alone.
pub(crate) async fn write_file(
    root: &Path,
    target: &Path,
    bytes: &[u8],
    hash: &str,
) -> std::io::Result<WriteOutcome> {
    if let Some(parent) = target.parent() {
        // Nothing may be created until the existing part of the path is
        // known to stay inside the root.
        let existing = nearest_existing(parent).await;
        ensure_within(&existing, root)?;
        fs::create_dir_all(parent).await?;
        ensure_within(parent, root)?;
    }

    match fs::symlink_metadata(target).await {
        Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(target).await?,
        Ok(meta) if meta.is_file() => {
            if let Ok(current) = fs::read(target).await {
                if content_hash(&current) == hash {
                    return Ok(WriteOutcome::Unchanged);
                }
            }
        }
        Ok(meta) if meta.is_dir() => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "a directory exists at this path",
            ))
        }
        _ => {}
    }

    fs::write(target, bytes).await?;
    Ok(WriteOutcome::Written)
}

/// The deepest ancestor of `path` (itself included) that exists on disk.
async fn nearest_existing(path: &Path) -> PathBuf {
    let mut candidate = path;
    loop {
        if fs::symlink_metadata(candidate).await.is_ok() {
            return candidate.to_path_buf();
        }
        match candidate.parent() {
            Some(parent) => candidate = parent,
            None => return candidate.to_path_buf(),
        }
    }
}

fn ensure_within(path: &Path, root: &Path) -> std::io::Result<()> {
    if is_within(path, root) {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "path escapes the project root",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents_and_skips_identical() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b/c.txt");
        let hash = content_hash(b"data");

        let outcome = write_file(dir.path(), &target, b"data", &hash).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(std::fs::read(&target).unwrap(), b"data");

        let outcome = write_file(dir.path(), &target, b"data", &hash).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_refuses_symlinked_parent() {
        let outside = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();

        let target = dir.path().join("escape/file.txt");
        let err = write_file(dir.path(), &target, b"x", &content_hash(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
        assert!(!outside.path().join("file.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_refused_write_creates_no_directories_outside_root() {
        let outside = TempDir::new().unwrap();
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();

        let target = dir.path().join("escape/sub/deeper/file.txt");
        let err = write_file(dir.path(), &target, b"x", &content_hash(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
        assert!(!outside.path().join("sub").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_replaces_symlink_instead_of_following() {
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("victim.txt"), "keep").unwrap();
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("link.txt");
        std::os::unix::fs::symlink(outside.path().join("victim.txt"), &target).unwrap();

        write_file(dir.path(), &target, b"new", &content_hash(b"new"))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(outside.path().join("victim.txt")).unwrap(),
            "keep"
        );
        assert!(!std::fs::symlink_metadata(&target)
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn test_report_counts() {
        let report = RestoreReport {
            written: vec!["a".into()],
            unchanged: vec!["b".into()],
            deleted: vec!["c".into()],
            failed: vec![FileFailure::new("d", "denied")],
            ..RestoreReport::new("snp_1")
        };
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.is_complete());
        assert_eq!(report.changed_paths(), vec!["a", "c"]);
    }
}
