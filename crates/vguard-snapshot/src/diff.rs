//! Line-level diffing of file contents and snapshots.

use crate::{FileContent, Snapshot, SnapshotFile};
use serde::Serialize;
use similar::{Algorithm, ChangeTag, DiffOp, TextDiff};
use std::collections::BTreeSet;

/// A single line-level difference.
///
/// `Add` carries the line number in the new content; `Remove` and `Modify`
/// carry the line number in the old content. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DiffChange {
    Add { line: usize, new: String },
    Remove { line: usize, old: String },
    Modify { line: usize, old: String, new: String },
}

impl DiffChange {
    pub fn line(&self) -> usize {
        match self {
            Self::Add { line, .. } | Self::Remove { line, .. } | Self::Modify { line, .. } => *line,
        }
    }
}

/// The differences between two versions of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    path: String,
    changes: Vec<DiffChange>,
    additions: usize,
    deletions: usize,
    summary: String,
    binary: bool,
}

impl DiffResult {
    /// Build a result whose counts are derived from `changes`.
    ///
    /// A `Modify` counts as one addition and one deletion.
    pub fn from_changes(path: impl Into<String>, changes: Vec<DiffChange>) -> Self {
        let mut additions = 0;
        let mut deletions = 0;
        for change in &changes {
            match change {
                DiffChange::Add { .. } => additions += 1,
                DiffChange::Remove { .. } => deletions += 1,
                DiffChange::Modify { .. } => {
                    additions += 1;
                    deletions += 1;
                }
            }
        }

        let path = path.into();
        let summary = summarize(&path, additions, deletions);
        Self {
            path,
            changes,
            additions,
            deletions,
            summary,
            binary: false,
        }
    }

    /// A result for content that is not line-diffable.
    pub fn binary(path: impl Into<String>) -> Self {
        let path = path.into();
        let summary = if path.is_empty() {
            "binary content differs".to_string()
        } else {
            format!("{path}: binary content differs")
        };
        Self {
            path,
            changes: Vec::new(),
            additions: 0,
            deletions: 0,
            summary,
            binary: true,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn changes(&self) -> &[DiffChange] {
        &self.changes
    }

    pub fn additions(&self) -> usize {
        self.additions
    }

    pub fn deletions(&self) -> usize {
        self.deletions
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// True when the two sides were identical.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && !self.binary
    }
}

fn summarize(path: &str, additions: usize, deletions: usize) -> String {
    let plural = |n: usize| if n == 1 { "" } else { "s" };
    let counts = format!(
        "{additions} addition{}, {deletions} deletion{}",
        plural(additions),
        plural(deletions)
    );
    if path.is_empty() {
        counts
    } else {
        format!("{path}: {counts}")
    }
}

/// A contiguous edited region, 0-based and half-open on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
}

impl Hunk {
    /// Lines only inserted, nothing removed.
    pub fn is_insertion(&self) -> bool {
        self.old_len == 0
    }

    /// Lines only removed, nothing inserted.
    pub fn is_deletion(&self) -> bool {
        self.new_len == 0
    }
}

/// Line diffing.
///
/// Alignment uses Myers' algorithm without a deadline, so the edit script is
/// always minimal and `diff_files(a, b).additions() == diff_files(b, a).deletions()`.
pub struct DiffEngine;

impl DiffEngine {
    /// Diff two file contents line by line.
    pub fn diff_files(old: &str, new: &str) -> DiffResult {
        Self::diff_file("", old, new)
    }

    /// Diff two file contents, labelling the result with `path`.
    pub fn diff_file(path: &str, old: &str, new: &str) -> DiffResult {
        let diff = line_diff(old, new);
        let old_lines = diff.old_slices();
        let new_lines = diff.new_slices();
        let mut changes = Vec::new();

        for op in diff.ops() {
            match *op {
                DiffOp::Equal { .. } => {}
                DiffOp::Delete {
                    old_index, old_len, ..
                } => {
                    for i in old_index..old_index + old_len {
                        changes.push(DiffChange::Remove {
                            line: i + 1,
                            old: trim_eol(old_lines[i]),
                        });
                    }
                }
                DiffOp::Insert {
                    new_index, new_len, ..
                } => {
                    for i in new_index..new_index + new_len {
                        changes.push(DiffChange::Add {
                            line: i + 1,
                            new: trim_eol(new_lines[i]),
                        });
                    }
                }
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    // Pair lines positionally; the longer side's tail is a
                    // plain removal or addition.
                    let paired = old_len.min(new_len);
                    for i in 0..paired {
                        changes.push(DiffChange::Modify {
                            line: old_index + i + 1,
                            old: trim_eol(old_lines[old_index + i]),
                            new: trim_eol(new_lines[new_index + i]),
                        });
                    }
                    for i in old_index + paired..old_index + old_len {
                        changes.push(DiffChange::Remove {
                            line: i + 1,
                            old: trim_eol(old_lines[i]),
                        });
                    }
                    for i in new_index + paired..new_index + new_len {
                        changes.push(DiffChange::Add {
                            line: i + 1,
                            new: trim_eol(new_lines[i]),
                        });
                    }
                }
            }
        }

        DiffResult::from_changes(path, changes)
    }

    /// Diff every file that differs between two snapshots.
    ///
    /// Paths present in either snapshot are considered; a file missing on one
    /// side is diffed against empty content. Files with equal hashes produce
    /// no result. Results are ordered by path.
    pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Vec<DiffResult> {
        let old_index = old.file_index();
        let new_index = new.file_index();
        let paths: BTreeSet<&str> = old_index.keys().chain(new_index.keys()).copied().collect();

        paths
            .into_iter()
            .filter_map(|path| {
                let before = old_index.get(path).copied();
                let after = new_index.get(path).copied();
                if let (Some(a), Some(b)) = (before, after) {
                    if a.hash == b.hash {
                        return None;
                    }
                }
                Some(Self::diff_entries(path, before, after))
            })
            .collect()
    }

    fn diff_entries(
        path: &str,
        before: Option<&SnapshotFile>,
        after: Option<&SnapshotFile>,
    ) -> DiffResult {
        fn text(file: Option<&SnapshotFile>) -> Option<&str> {
            match file.map(|f| &f.content) {
                None => Some(""),
                Some(FileContent::Text(text)) => Some(text.as_str()),
                Some(FileContent::Binary(_)) => None,
            }
        }

        match (text(before), text(after)) {
            (Some(old), Some(new)) => Self::diff_file(path, old, new),
            _ => DiffResult::binary(path),
        }
    }

    /// The edited regions between two contents, in order.
    pub fn hunks(old: &str, new: &str) -> Vec<Hunk> {
        line_diff(old, new)
            .ops()
            .iter()
            .filter_map(|op| match *op {
                DiffOp::Equal { .. } => None,
                DiffOp::Delete {
                    old_index,
                    old_len,
                    new_index,
                } => Some(Hunk {
                    old_start: old_index,
                    old_len,
                    new_start: new_index,
                    new_len: 0,
                }),
                DiffOp::Insert {
                    old_index,
                    new_index,
                    new_len,
                } => Some(Hunk {
                    old_start: old_index,
                    old_len: 0,
                    new_start: new_index,
                    new_len,
                }),
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => Some(Hunk {
                    old_start: old_index,
                    old_len,
                    new_start: new_index,
                    new_len,
                }),
            })
            .collect()
    }

    /// Render a unified diff with three lines of context.
    pub fn unified(old: &str, new: &str, path: &str) -> String {
        let diff = line_diff(old, new);
        let mut output = String::new();

        output.push_str(&format!("--- a/{path}\n"));
        output.push_str(&format!("+++ b/{path}\n"));

        for group in diff.grouped_ops(3) {
            let (Some(first), Some(last)) = (group.first(), group.last()) else {
                continue;
            };
            let old_range = first.old_range().start..last.old_range().end;
            let new_range = first.new_range().start..last.new_range().end;
            output.push_str(&format!(
                "@@ -{},{} +{},{} @@\n",
                hunk_start(old_range.start, old_range.len()),
                old_range.len(),
                hunk_start(new_range.start, new_range.len()),
                new_range.len()
            ));

            for op in &group {
                for change in diff.iter_changes(op) {
                    let sign = match change.tag() {
                        ChangeTag::Delete => "-",
                        ChangeTag::Insert => "+",
                        ChangeTag::Equal => " ",
                    };

                    output.push_str(sign);
                    output.push_str(change.value());
                    if !change.value().ends_with('\n') {
                        output.push_str("\n\\ No newline at end of file\n");
                    }
                }
            }
        }

        output
    }
}

fn line_diff<'a>(old: &'a str, new: &'a str) -> TextDiff<'a, 'a, 'a, str> {
    TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(old, new)
}

fn trim_eol(line: &str) -> String {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
        .to_string()
}

/// Unified diff line numbers are 1-based, except an empty range names the
/// line before it.
fn hunk_start(start: usize, len: usize) -> usize {
    if len == 0 {
        start
    } else {
        start + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SnapshotId, SnapshotMetadata};
    use chrono::Utc;
    use std::path::PathBuf;

    fn snapshot(files: &[(&str, &[u8])]) -> Snapshot {
        let mut files: Vec<SnapshotFile> = files
            .iter()
            .map(|(path, bytes)| SnapshotFile::new(*path, bytes.to_vec()))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Snapshot {
            id: SnapshotId::new(),
            name: "test".into(),
            description: None,
            created_at: Utc::now(),
            metadata: SnapshotMetadata {
                root: PathBuf::from("/p"),
                file_count: files.len(),
                total_size: files.iter().map(|f| f.size).sum(),
                creator: None,
                skipped: Vec::new(),
            },
            files,
            vcs_commit: None,
            tags: Default::default(),
        }
    }

    #[test]
    fn test_identical_content_has_no_changes() {
        let text = "one\ntwo\nthree\n";
        let result = DiffEngine::diff_files(text, text);
        assert!(result.is_empty());
        assert_eq!(result.additions(), 0);
        assert_eq!(result.deletions(), 0);
    }

    #[test]
    fn test_single_insertion() {
        let old = "1\n2\n3\n4\n6\n";
        let new = "1\n2\n3\n4\n5\n6\n";
        let result = DiffEngine::diff_files(old, new);
        assert_eq!(
            result.changes(),
            &[DiffChange::Add {
                line: 5,
                new: "5".into()
            }]
        );
        assert_eq!(result.additions(), 1);
        assert_eq!(result.deletions(), 0);
        assert_eq!(result.summary(), "1 addition, 0 deletions");
    }

    #[test]
    fn test_changed_line_is_a_modify() {
        let result = DiffEngine::diff_files("a\nb\nc\n", "a\nB\nc\n");
        assert_eq!(
            result.changes(),
            &[DiffChange::Modify {
                line: 2,
                old: "b".into(),
                new: "B".into()
            }]
        );
        assert_eq!(result.additions(), 1);
        assert_eq!(result.deletions(), 1);
    }

    #[test]
    fn test_uneven_replace_splits_into_modify_and_add() {
        let result = DiffEngine::diff_files("a\nx\nc\n", "a\ny\nz\nc\n");
        assert_eq!(
            result.changes(),
            &[
                DiffChange::Modify {
                    line: 2,
                    old: "x".into(),
                    new: "y".into()
                },
                DiffChange::Add {
                    line: 3,
                    new: "z".into()
                },
            ]
        );
    }

    #[test]
    fn test_counts_are_symmetric() {
        let pairs = [
            ("a\nb\nc\n", "a\nc\nd\ne\n"),
            ("", "x\ny\n"),
            ("fn main() {}\n", "fn main() {\n    run();\n}\n"),
            ("1\n2\n3\n4\n5\n", "5\n4\n3\n2\n1\n"),
        ];
        for (a, b) in pairs {
            let forward = DiffEngine::diff_files(a, b);
            let backward = DiffEngine::diff_files(b, a);
            assert_eq!(forward.additions(), backward.deletions(), "{a:?} -> {b:?}");
            assert_eq!(forward.deletions(), backward.additions(), "{a:?} -> {b:?}");
        }
    }

    #[test]
    fn test_diff_snapshots_skips_identical_files() {
        let a = snapshot(&[("same.txt", b"x\n"), ("edit.txt", b"1\n"), ("gone.txt", b"g\n")]);
        let b = snapshot(&[("same.txt", b"x\n"), ("edit.txt", b"2\n"), ("new.txt", b"n\n")]);

        let results = DiffEngine::diff_snapshots(&a, &b);
        let paths: Vec<_> = results.iter().map(|r| r.path()).collect();
        assert_eq!(paths, vec!["edit.txt", "gone.txt", "new.txt"]);

        let gone = &results[1];
        assert_eq!(gone.deletions(), 1);
        assert_eq!(gone.additions(), 0);
        let added = &results[2];
        assert_eq!(added.additions(), 1);
    }

    #[test]
    fn test_binary_files_are_not_line_diffed() {
        let a = snapshot(&[("logo.png", &[0u8, 1, 2])]);
        let b = snapshot(&[("logo.png", &[0u8, 1, 3])]);

        let results = DiffEngine::diff_snapshots(&a, &b);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_binary());
        assert!(results[0].changes().is_empty());
    }

    #[test]
    fn test_hunks() {
        let hunks = DiffEngine::hunks("a\nb\nc\n", "a\nX\nc\nd\n");
        assert_eq!(
            hunks,
            vec![
                Hunk {
                    old_start: 1,
                    old_len: 1,
                    new_start: 1,
                    new_len: 1
                },
                Hunk {
                    old_start: 3,
                    old_len: 0,
                    new_start: 3,
                    new_len: 1
                },
            ]
        );
        assert!(hunks[1].is_insertion());
    }

    #[test]
    fn test_unified_diff() {
        let diff = DiffEngine::unified("line 1\nline 2\nline 3\n", "line 1\nmodified line\nline 3\n", "test.txt");
        assert!(diff.starts_with("--- a/test.txt\n+++ b/test.txt\n"));
        assert!(diff.contains("@@ -1,3 +1,3 @@"));
        assert!(diff.contains("-line 2\n"));
        assert!(diff.contains("+modified line\n"));
    }
}
