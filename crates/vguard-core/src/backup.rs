//! Restorable copies of the working tree.
//!
//! Backups live under `backups/<id>/`:
//! ```text
//! backups/
//!   <backup_id>/
//!     manifest.json        # Backup record plus per-file hash and size
//!     files/
//!       <relative_path>    # Raw copy, or <relative_path>.gz when compressed
//! ```
//! A backup is assembled in `backups/.tmp-<id>/` and renamed into place only
//! once every file and the manifest are written, so a failed or cancelled
//! backup leaves nothing behind.

use crate::error::{GuardianError, GuardianResult};
use crate::restore::{write_file, FileFailure, RestoreReport, WriteOutcome};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vguard_snapshot::{FileScanner, ProgressReporter};
use vguard_storage::{JsonStorage, Storage};
use vguard_util::{content_hash, path::safe_join, Identifier, TimingGuard};

const BACKUPS_DIR: &str = "backups";
const FILES_DIR: &str = "files";
const MANIFEST: &str = "manifest";
const TEMP_PREFIX: &str = ".tmp-";

/// A restore point of the working tree.
///
/// Backups are restored, never diffed or rolled back to; they share no type
/// with snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Directory holding the backup.
    pub path: PathBuf,
    /// Total size of the original files in bytes.
    pub size: u64,
    pub file_count: usize,
    pub compressed: bool,
    /// Remote location the backup is meant to be mirrored to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

/// Options for [`BackupManager::create`].
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Gzip each file.
    pub compress: bool,
    /// Remote location recorded on the backup.
    pub remote: Option<String>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BackupEntry {
    path: String,
    hash: String,
    size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    backup: Backup,
    files: Vec<BackupEntry>,
}

/// Creates, lists and restores backups.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backups_dir: PathBuf,
    scanner: FileScanner,
}

impl BackupManager {
    /// Manager for backups under `storage_dir/backups`.
    pub fn new(storage_dir: &Path, scanner: FileScanner) -> Self {
        Self {
            backups_dir: storage_dir.join(BACKUPS_DIR),
            scanner,
        }
    }

    /// Copy the current working tree into a new backup.
    ///
    /// Either every file is captured or the call fails and nothing is kept.
    pub async fn create(
        &self,
        name: Option<String>,
        options: &BackupOptions,
        progress: Option<&dyn ProgressReporter>,
    ) -> GuardianResult<Backup> {
        let id = Identifier::backup();
        let name = name.unwrap_or_else(|| format!("backup-{}", Utc::now().format("%Y%m%d-%H%M%S")));
        let _timing = TimingGuard::backup(&name);

        let temp_dir = self.backups_dir.join(format!("{TEMP_PREFIX}{id}"));
        fs::create_dir_all(&temp_dir).await?;

        match self
            .write_backup(&id, &name, &temp_dir, options, progress)
            .await
        {
            Ok(backup) => {
                info!(
                    backup_id = %backup.id,
                    name = %backup.name,
                    files = backup.file_count,
                    size = backup.size,
                    compressed = backup.compressed,
                    "Created backup"
                );
                Ok(backup)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&temp_dir).await {
                    warn!(path = %temp_dir.display(), error = %cleanup, "Failed to remove partial backup");
                }
                warn!(backup_id = %id, error = %e, "Backup failed");
                Err(e)
            }
        }
    }

    async fn write_backup(
        &self,
        id: &str,
        name: &str,
        temp_dir: &Path,
        options: &BackupOptions,
        progress: Option<&dyn ProgressReporter>,
    ) -> GuardianResult<Backup> {
        let listing = self.scanner.enumerate(&options.cancel)?;
        if let Some(skipped) = listing.skipped.first() {
            return Err(unreadable(&skipped.path, &skipped.error));
        }

        let files_dir = temp_dir.join(FILES_DIR);
        let total = listing.paths.len();
        let mut entries = Vec::with_capacity(total);

        for (idx, key) in listing.paths.into_iter().enumerate() {
            if options.cancel.is_cancelled() {
                return Err(GuardianError::Cancelled);
            }

            let bytes = fs::read(self.scanner.root().join(&key))
                .await
                .map_err(|e| unreadable(&key, e))?;

            let stored_key = if options.compress {
                format!("{key}.gz")
            } else {
                key.clone()
            };
            let target = safe_join(&files_dir, &stored_key)
                .ok_or_else(|| GuardianError::validation(id, format!("unsafe path {key}")))?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).await?;
            }
            if options.compress {
                fs::write(&target, gzip(&bytes)?).await?;
            } else {
                fs::write(&target, &bytes).await?;
            }

            debug!(path = %key, size = bytes.len(), "Backed up file");
            entries.push(BackupEntry {
                hash: content_hash(&bytes),
                size: bytes.len() as u64,
                path: key,
            });

            if let Some(progress) = progress {
                progress.on_progress(idx + 1, total);
            }
        }

        if options.cancel.is_cancelled() {
            return Err(GuardianError::Cancelled);
        }

        let final_dir = self.backups_dir.join(id);
        let backup = Backup {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            path: final_dir.clone(),
            size: entries.iter().map(|e| e.size).sum(),
            file_count: entries.len(),
            compressed: options.compress,
            remote: options.remote.clone(),
        };

        let manifest = Manifest {
            backup: backup.clone(),
            files: entries,
        };
        JsonStorage::new(temp_dir)
            .write(&[MANIFEST], &manifest)
            .await?;

        fs::rename(temp_dir, &final_dir).await?;
        Ok(backup)
    }

    /// Get a backup by ID.
    pub async fn get(&self, id: &str) -> GuardianResult<Backup> {
        Ok(self.manifest(id).await?.backup)
    }

    /// List all backups, newest first.
    pub async fn list(&self) -> GuardianResult<Vec<Backup>> {
        let mut entries = match fs::read_dir(&self.backups_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            backups.push(self.get(&name).await?);
        }

        // Sort by timestamp (newest first)
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(backups)
    }

    /// Delete a backup.
    pub async fn delete(&self, id: &str) -> GuardianResult<()> {
        let dir = self.backup_dir(id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(backup_id = %id, "Deleted backup");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(GuardianError::backup_not_found(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write every file of a backup back to its original path.
    ///
    /// Nothing is deleted. Per-file failures are collected in the report.
    /// When `deadline` passes, the remaining paths are listed as not
    /// processed and files already written stay written.
    pub async fn restore(&self, id: &str, deadline: Option<Instant>) -> GuardianResult<RestoreReport> {
        let manifest = self.manifest(id).await?;
        let _timing = TimingGuard::restore(id);
        let files_dir = self.backup_dir(id)?.join(FILES_DIR);
        let compressed = manifest.backup.compressed;
        let mut report = RestoreReport::new(id);

        let mut remaining = manifest.files.into_iter();
        while let Some(entry) = remaining.next() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(backup_id = %id, "Restore timed out");
                report.timed_out = true;
                report.not_processed.push(entry.path);
                report.not_processed.extend(remaining.by_ref().map(|e| e.path));
                break;
            }

            match self.restore_entry(&files_dir, &entry, compressed).await {
                Ok(WriteOutcome::Written) => {
                    debug!(path = %entry.path, "Restored file");
                    report.written.push(entry.path);
                }
                Ok(WriteOutcome::Unchanged) => report.unchanged.push(entry.path),
                Err(error) => {
                    warn!(path = %entry.path, error = %error, "Failed to restore file");
                    report.failed.push(FileFailure::new(entry.path, error));
                }
            }
        }

        info!(
            backup_id = %id,
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            timed_out = report.timed_out,
            "Restored backup"
        );
        Ok(report)
    }

    async fn restore_entry(
        &self,
        files_dir: &Path,
        entry: &BackupEntry,
        compressed: bool,
    ) -> Result<WriteOutcome, String> {
        let target = self
            .scanner
            .resolve(&entry.path)
            .ok_or_else(|| "path escapes the project root".to_string())?;

        let stored_key = if compressed {
            format!("{}.gz", entry.path)
        } else {
            entry.path.clone()
        };
        let source = safe_join(files_dir, &stored_key)
            .ok_or_else(|| "path escapes the backup".to_string())?;

        let raw = fs::read(&source).await.map_err(|e| e.to_string())?;
        let bytes = if compressed {
            gunzip(&raw).map_err(|e| e.to_string())?
        } else {
            raw
        };
        if content_hash(&bytes) != entry.hash {
            return Err("backup content does not match its hash".to_string());
        }

        write_file(self.scanner.root(), &target, &bytes, &entry.hash)
            .await
            .map_err(|e| e.to_string())
    }

    async fn manifest(&self, id: &str) -> GuardianResult<Manifest> {
        let dir = self.backup_dir(id)?;
        let manifest: Manifest = JsonStorage::new(&dir)
            .read(&[MANIFEST])
            .await
            .map_err(|e| GuardianError::validation(id, e.to_string()))?
            .ok_or_else(|| GuardianError::backup_not_found(id))?;

        if manifest.backup.id != id {
            return Err(GuardianError::validation(
                id,
                format!("manifest belongs to backup {}", manifest.backup.id),
            ));
        }
        Ok(manifest)
    }

    fn backup_dir(&self, id: &str) -> GuardianResult<PathBuf> {
        if !Identifier::is_valid(id) {
            return Err(GuardianError::backup_not_found(id));
        }
        Ok(self.backups_dir.join(id))
    }
}

fn unreadable(path: &str, error: impl std::fmt::Display) -> GuardianError {
    GuardianError::Io(std::io::Error::other(format!(
        "cannot back up {path}: {error}"
    )))
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn gunzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vguard_snapshot::IgnoreRules;

    fn setup_test() -> (TempDir, BackupManager) {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join(".vguard");
        let scanner = FileScanner::new(dir.path(), IgnoreRules::default());
        let manager = BackupManager::new(&storage, scanner);
        (dir, manager)
    }

    fn write(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_create_and_restore_backup() {
        let (dir, manager) = setup_test();
        write(dir.path(), "src/main.rs", b"fn main() {}\n");
        write(dir.path(), "README.md", b"# readme\n");

        let backup = manager
            .create(Some("manual".into()), &BackupOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(backup.file_count, 2);
        assert_eq!(backup.name, "manual");
        assert!(!backup.compressed);
        assert!(backup.path.join("files/src/main.rs").exists());

        write(dir.path(), "src/main.rs", b"broken");
        write(dir.path(), "new.txt", b"created later");

        let report = manager.restore(&backup.id, None).await.unwrap();
        assert_eq!(report.written, vec!["src/main.rs"]);
        assert_eq!(report.unchanged, vec!["README.md"]);
        assert!(report.is_complete());
        assert_eq!(
            std::fs::read(dir.path().join("src/main.rs")).unwrap(),
            b"fn main() {}\n"
        );
        // Restoring a backup never deletes.
        assert!(dir.path().join("new.txt").exists());
    }

    #[tokio::test]
    async fn test_compressed_backup_round_trips_binary() {
        let (dir, manager) = setup_test();
        let binary = vec![0u8, 255, 1, 254, 0, 0, 7];
        write(dir.path(), "image.bin", &binary);

        let options = BackupOptions {
            compress: true,
            ..Default::default()
        };
        let backup = manager.create(None, &options, None).await.unwrap();
        assert!(backup.compressed);
        assert!(backup.path.join("files/image.bin.gz").exists());

        std::fs::remove_file(dir.path().join("image.bin")).unwrap();
        let report = manager.restore(&backup.id, None).await.unwrap();
        assert_eq!(report.written, vec!["image.bin"]);
        assert_eq!(std::fs::read(dir.path().join("image.bin")).unwrap(), binary);
    }

    #[tokio::test]
    async fn test_cancelled_backup_leaves_nothing() {
        let (dir, manager) = setup_test();
        write(dir.path(), "a.txt", b"a");

        let options = BackupOptions::default();
        options.cancel.cancel();
        let err = manager.create(None, &options, None).await.unwrap_err();
        assert!(matches!(err, GuardianError::Cancelled));

        assert!(manager.list().await.unwrap().is_empty());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join(".vguard/backups"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_backup_excludes_storage_dir() {
        let (dir, manager) = setup_test();
        write(dir.path(), "a.txt", b"a");

        let first = manager.create(None, &BackupOptions::default(), None).await.unwrap();
        let second = manager.create(None, &BackupOptions::default(), None).await.unwrap();
        assert_eq!(first.file_count, 1);
        assert_eq!(second.file_count, 1);
    }

    #[tokio::test]
    async fn test_list_get_delete() {
        let (dir, manager) = setup_test();
        write(dir.path(), "a.txt", b"a");

        let older = manager.create(Some("one".into()), &BackupOptions::default(), None).await.unwrap();
        let newer = manager
            .create(
                Some("two".into()),
                &BackupOptions {
                    remote: Some("s3://bucket/backups".into()),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();

        let listed = manager.list().await.unwrap();
        let ids: Vec<_> = listed.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
        assert_eq!(
            manager.get(&newer.id).await.unwrap().remote.as_deref(),
            Some("s3://bucket/backups")
        );

        manager.delete(&older.id).await.unwrap();
        assert!(matches!(
            manager.get(&older.id).await,
            Err(GuardianError::NotFound { .. })
        ));
        assert!(matches!(
            manager.delete(&older.id).await,
            Err(GuardianError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_restore_unknown_backup() {
        let (_dir, manager) = setup_test();
        assert!(matches!(
            manager.restore("bak_missing", None).await,
            Err(GuardianError::NotFound { .. })
        ));
        assert!(matches!(
            manager.restore("../../etc", None).await,
            Err(GuardianError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_restore_timeout_lists_remaining() {
        let (dir, manager) = setup_test();
        write(dir.path(), "a.txt", b"a");
        write(dir.path(), "b.txt", b"b");

        let backup = manager.create(None, &BackupOptions::default(), None).await.unwrap();
        let report = manager
            .restore(&backup.id, Some(Instant::now()))
            .await
            .unwrap();

        assert!(report.timed_out);
        assert_eq!(report.not_processed, vec!["a.txt", "b.txt"]);
        assert!(report.written.is_empty());
    }

    #[tokio::test]
    async fn test_restore_reports_tampered_file() {
        let (dir, manager) = setup_test();
        write(dir.path(), "a.txt", b"a");
        write(dir.path(), "b.txt", b"b");

        let backup = manager.create(None, &BackupOptions::default(), None).await.unwrap();
        std::fs::write(backup.path.join("files/a.txt"), "tampered").unwrap();
        std::fs::write(dir.path().join("b.txt"), "changed").unwrap();

        let report = manager.restore(&backup.id, None).await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "a.txt");
        assert_eq!(report.written, vec!["b.txt"]);
    }
}
