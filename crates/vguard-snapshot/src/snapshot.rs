//! Snapshot data structures.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use vguard_util::{content_hash, is_binary, Identifier};

/// Unique identifier for a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    /// Create a new time-ordered snapshot ID.
    pub fn new() -> Self {
        Self(Identifier::snapshot())
    }

    /// Create a snapshot ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SnapshotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stored file content.
///
/// Text is kept verbatim so records stay readable; anything else is base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
pub enum FileContent {
    Text(String),
    Binary(String),
}

impl FileContent {
    /// Wrap raw bytes, choosing the encoding from the content.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if is_binary(&bytes) {
            return Self::Binary(STANDARD.encode(&bytes));
        }
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(e) => Self::Binary(STANDARD.encode(e.as_bytes())),
        }
    }

    /// Decode back to the original bytes.
    ///
    /// Returns `None` if a binary payload is not valid base64.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Text(text) => Some(text.as_bytes().to_vec()),
            Self::Binary(encoded) => STANDARD.decode(encoded).ok(),
        }
    }

    /// The content as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

/// A single file captured in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    pub content: FileContent,
    /// SHA-256 of the raw bytes.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
}

impl SnapshotFile {
    /// Capture a file. The hash and size always come from `bytes`.
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let hash = content_hash(&bytes);
        let size = bytes.len() as u64;
        Self {
            path: path.into(),
            content: FileContent::from_bytes(bytes),
            hash,
            size,
        }
    }

    /// Whether the stored hash still matches the stored content.
    pub fn verify(&self) -> bool {
        self.content
            .to_bytes()
            .is_some_and(|bytes| content_hash(&bytes) == self.hash)
    }
}

/// A file the scanner could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub error: String,
}

/// Descriptive data about a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Project root the snapshot was taken from.
    pub root: PathBuf,
    pub file_count: usize,
    /// Sum of all file sizes in bytes.
    pub total_size: u64,
    /// Who or what took the snapshot (e.g. "user", "auto", "pre-edit").
    #[serde(default)]
    pub creator: Option<String>,
    /// Files excluded because they could not be read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFile>,
}

/// An immutable capture of the project tree at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier for this snapshot.
    pub id: SnapshotId,

    /// Human-readable name.
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,

    /// Captured files, sorted by path.
    pub files: Vec<SnapshotFile>,

    pub metadata: SnapshotMetadata,

    /// Commit of an external VCS the tree corresponded to, if known.
    #[serde(default)]
    pub vcs_commit: Option<String>,

    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Snapshot {
    /// Look up a file by its relative path.
    pub fn file(&self, path: &str) -> Option<&SnapshotFile> {
        self.files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .map(|idx| &self.files[idx])
    }

    /// Map of relative path to file.
    pub fn file_index(&self) -> BTreeMap<&str, &SnapshotFile> {
        self.files.iter().map(|f| (f.path.as_str(), f)).collect()
    }

    /// Check if this snapshot includes a specific file.
    pub fn contains_file(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}
