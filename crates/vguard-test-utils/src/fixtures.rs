//! Temporary project trees for tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Directory names left out of [`BuiltTestProject::tree`].
const STORAGE_DIRS: &[&str] = &[".vguard", ".git"];

/// A temporary test project with configurable file structure.
///
/// Creates a temporary directory that is automatically cleaned up
/// when the built project is dropped.
///
/// # Example
///
/// ```rust
/// use vguard_test_utils::fixtures::TestProject;
///
/// let project = TestProject::new()
///     .with_file("src/a.ts", "export const a = 1;\n")
///     .with_lines("src/b.ts", 5)
///     .with_dir("empty")
///     .build();
///
/// assert!(project.file_exists("src/b.ts"));
/// assert_eq!(project.read_file("src/b.ts").lines().count(), 5);
/// ```
pub struct TestProject {
    temp_dir: TempDir,
    /// Files to create (path relative to root -> contents).
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: Vec<PathBuf>,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            files: BTreeMap::new(),
            dirs: Vec::new(),
        }
    }

    /// Add a text file. Parent directories are created automatically.
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.with_bytes(path, contents.into().into_bytes())
    }

    /// Add a file with arbitrary bytes.
    pub fn with_bytes(mut self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), contents.into());
        self
    }

    /// Add a file of `count` numbered lines (`line 1` .. `line N`).
    pub fn with_lines(self, path: impl AsRef<Path>, count: usize) -> Self {
        self.with_file(path, content::numbered_lines(count))
    }

    /// Add an empty directory.
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Add a `vguard.json` configuration file.
    pub fn with_config(self, config: &str) -> Self {
        self.with_file("vguard.json", config)
    }

    pub fn with_gitignore(self, contents: &str) -> Self {
        self.with_file(".gitignore", contents)
    }

    /// Create all files and directories on disk.
    pub fn build(self) -> BuiltTestProject {
        let root = self.temp_dir.path();

        for dir in &self.dirs {
            let full_path = root.join(dir);
            fs::create_dir_all(&full_path).unwrap_or_else(|e| {
                panic!("Failed to create directory {}: {}", full_path.display(), e)
            });
        }

        for (path, contents) in &self.files {
            write_bytes(&root.join(path), contents);
        }

        BuiltTestProject {
            temp_dir: self.temp_dir,
        }
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// A built test project with files created on disk.
pub struct BuiltTestProject {
    temp_dir: TempDir,
}

impl BuiltTestProject {
    /// Get the path to the project root.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn read_file(&self, path: impl AsRef<Path>) -> String {
        let full_path = self.path().join(path.as_ref());
        fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    pub fn read_bytes(&self, path: impl AsRef<Path>) -> Vec<u8> {
        let full_path = self.path().join(path.as_ref());
        fs::read(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read file {}: {}", full_path.display(), e))
    }

    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        self.path().join(path.as_ref()).exists()
    }

    /// Write a file, creating parent directories.
    pub fn write_file(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        write_bytes(&self.path().join(path.as_ref()), contents.as_ref());
    }

    /// Replace line `line` (1-based) of a text file.
    pub fn edit_line(&self, path: impl AsRef<Path>, line: usize, replacement: &str) {
        let path = path.as_ref();
        let mut lines: Vec<String> = self.read_file(path).lines().map(String::from).collect();
        assert!(
            line >= 1 && line <= lines.len(),
            "{} has no line {}",
            path.display(),
            line
        );
        lines[line - 1] = replacement.to_string();
        self.write_file(path, lines.join("\n") + "\n");
    }

    pub fn delete_file(&self, path: impl AsRef<Path>) {
        let full_path = self.path().join(path.as_ref());
        fs::remove_file(&full_path)
            .unwrap_or_else(|e| panic!("Failed to delete file {}: {}", full_path.display(), e));
    }

    /// Every file in the project keyed by `/`-separated relative path,
    /// leaving out the storage directory.
    pub fn tree(&self) -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        collect(self.path(), self.path(), &mut files);
        files
    }
}

fn collect(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("Failed to read directory {}: {}", dir.display(), e));
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            let name = entry.file_name();
            if !STORAGE_DIRS.contains(&&*name.to_string_lossy()) {
                collect(root, &path, files);
            }
        } else if file_type.is_file() {
            let key = path
                .strip_prefix(root)
                .map(|p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_else(|_| path.display().to_string());
            let bytes = fs::read(&path)
                .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));
            files.insert(key, bytes);
        }
    }
}

fn write_bytes(full_path: &Path, contents: &[u8]) {
    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent).unwrap_or_else(|e| {
            panic!(
                "Failed to create parent directory for {}: {}",
                full_path.display(),
                e
            )
        });
    }
    fs::write(full_path, contents)
        .unwrap_or_else(|e| panic!("Failed to write file {}: {}", full_path.display(), e));
}

/// Common test file contents.
pub mod content {
    /// `line 1\nline 2\n...` with a trailing newline.
    pub fn numbered_lines(count: usize) -> String {
        (1..=count).map(|i| format!("line {i}\n")).collect()
    }

    /// Bytes that are not valid UTF-8.
    pub const BINARY: &[u8] = &[0x89, b'P', b'N', b'G', 0x00, 0xff, 0xfe, 0x01];
}
