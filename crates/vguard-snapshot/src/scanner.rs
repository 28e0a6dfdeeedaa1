//! Working-tree enumeration.
//!
//! The scanner walks the project root with [`ignore::WalkBuilder`], never
//! following symlinks, and reads every regular file that survives the ignore
//! rules. A file that cannot be read is reported in [`ScanReport::skipped`]
//! instead of failing the scan; only an unreadable root is fatal.

use crate::{SkippedFile, SnapshotError, SnapshotFile, SnapshotResult};
use glob::Pattern;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vguard_util::path::{relative_key, safe_join, STORAGE_DIR_NAME};
use vguard_util::TimingGuard;

/// Directory names that are never part of a snapshot.
const ALWAYS_IGNORED: &[&str] = &[STORAGE_DIR_NAME, ".git"];

/// Receives `(files_processed, total_files)` while a scan runs.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, processed: usize, total: usize);
}

impl<F> ProgressReporter for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, processed: usize, total: usize) {
        self(processed, total)
    }
}

/// Caller-supplied predicate over relative paths; `true` means ignore.
pub type IgnorePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Which paths the scanner leaves out.
#[derive(Clone)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
    respect_gitignore: bool,
    predicate: Option<IgnorePredicate>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            respect_gitignore: true,
            predicate: None,
        }
    }
}

impl std::fmt::Debug for IgnoreRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IgnoreRules")
            .field("patterns", &self.patterns)
            .field("respect_gitignore", &self.respect_gitignore)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl IgnoreRules {
    /// Build rules from glob patterns such as `target/**` or `*.log`.
    ///
    /// A pattern matches a file if it matches the file's relative path or
    /// any of its parent directories. Patterns without a `/` also match
    /// single path components, so `node_modules` excludes every
    /// `node_modules` directory.
    pub fn new<I, P>(patterns: I) -> SnapshotResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(p.trim_end_matches('/')).map_err(|e| SnapshotError::InvalidPattern {
                    pattern: p.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<SnapshotResult<Vec<_>>>()?;

        Ok(Self {
            patterns,
            ..Self::default()
        })
    }

    /// Whether `.gitignore` files are honoured.
    pub fn with_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }

    /// Add a predicate consulted after the glob patterns.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Check a `/`-separated relative path against the rules.
    pub fn is_ignored(&self, key: &str) -> bool {
        let mut prefix = String::with_capacity(key.len());
        for component in key.split('/') {
            if ALWAYS_IGNORED.contains(&component) {
                return true;
            }
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);

            let matched = self.patterns.iter().any(|pattern| {
                pattern.matches(&prefix)
                    || (!pattern.as_str().contains('/') && pattern.matches(component))
            });
            if matched {
                return true;
            }
        }

        self.predicate.as_ref().is_some_and(|p| p(key))
    }
}

/// Paths found by [`FileScanner::enumerate`].
#[derive(Debug, Clone, Default)]
pub struct Enumeration {
    /// Relative paths of regular files, sorted.
    pub paths: Vec<String>,
    /// Entries the walk could not inspect.
    pub skipped: Vec<SkippedFile>,
}

/// Result of reading the tree.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Files read, sorted by path.
    pub files: Vec<SnapshotFile>,
    /// Files excluded because they could not be read.
    pub skipped: Vec<SkippedFile>,
}

impl ScanReport {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Enumerates and reads the files of a project tree.
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    rules: IgnoreRules,
    excluded: Vec<PathBuf>,
}

impl FileScanner {
    /// Create a scanner for `root`.
    pub fn new(root: impl Into<PathBuf>, rules: IgnoreRules) -> Self {
        Self {
            root: root.into(),
            rules,
            excluded: Vec::new(),
        }
    }

    /// Never descend into `dir` (e.g. a storage directory inside the root).
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    /// The project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative path against the root, refusing escapes.
    pub fn resolve(&self, key: &str) -> Option<PathBuf> {
        safe_join(&self.root, key)
    }

    /// Whether a relative path is covered by the ignore rules.
    pub fn is_ignored(&self, key: &str) -> bool {
        self.rules.is_ignored(key)
    }

    /// List the relative paths of all non-ignored regular files.
    ///
    /// Symlinks are never followed and never listed.
    pub fn enumerate(&self, cancel: &CancellationToken) -> SnapshotResult<Enumeration> {
        // An unreadable root fails the whole scan.
        std::fs::read_dir(&self.root)?;

        let root = self.root.clone();
        let rules = self.rules.clone();
        let excluded = self.excluded.clone();

        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(self.rules.respect_gitignore)
            .git_exclude(self.rules.respect_gitignore)
            .git_global(false)
            .require_git(false)
            .parents(false)
            .follow_links(false)
            .filter_entry(move |entry| {
                if excluded.iter().any(|dir| entry.path().starts_with(dir)) {
                    return false;
                }
                match relative_key(entry.path(), &root) {
                    Some(key) => !rules.is_ignored(&key),
                    // The root itself.
                    None => true,
                }
            })
            .build();

        let mut listing = Enumeration::default();

        for entry in walker {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = error_path(&e)
                        .and_then(|p| relative_key(p, &self.root))
                        .unwrap_or_default();
                    warn!(path = %path, error = %e, "Skipping unreadable entry");
                    listing.skipped.push(SkippedFile {
                        path,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            match relative_key(entry.path(), &self.root) {
                Some(key) => listing.paths.push(key),
                None => {
                    warn!(path = %entry.path().display(), "Skipping path that is not valid UTF-8");
                    listing.skipped.push(SkippedFile {
                        path: entry.path().to_string_lossy().into_owned(),
                        error: "path is not valid UTF-8".to_string(),
                    });
                }
            }
        }

        listing.paths.sort();
        Ok(listing)
    }

    /// Read every non-ignored file under the root.
    ///
    /// Cancellation is checked between files; a cancelled scan returns
    /// [`SnapshotError::Cancelled`] and nothing else.
    pub async fn scan(
        &self,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressReporter>,
    ) -> SnapshotResult<ScanReport> {
        let _timing = TimingGuard::scan(self.root.display().to_string());

        let listing = self.enumerate(cancel)?;
        let total = listing.paths.len();
        let mut report = ScanReport {
            files: Vec::with_capacity(total),
            skipped: listing.skipped,
        };

        for (idx, key) in listing.paths.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SnapshotError::Cancelled);
            }

            let path = self.root.join(&key);
            match fs::read(&path).await {
                Ok(bytes) => {
                    debug!(path = %key, size = bytes.len(), "Scanned file");
                    report.files.push(SnapshotFile::new(key, bytes));
                }
                Err(e) => {
                    warn!(path = %key, error = %e, "Skipping unreadable file");
                    report.skipped.push(SkippedFile {
                        path: key,
                        error: e.to_string(),
                    });
                }
            }

            if let Some(progress) = progress {
                progress.on_progress(idx + 1, total);
            }
        }

        report.skipped.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(report)
    }
}

/// Dig the offending path out of a walk error, if it carries one.
fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child),
        _ => None,
    }
}
