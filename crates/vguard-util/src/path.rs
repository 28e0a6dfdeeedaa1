//! Path utilities.
//!
//! Snapshots and backups store paths relative to the project root as
//! `/`-separated strings. These helpers convert between that form and
//! filesystem paths without ever letting a stored path escape the root.

use std::path::{Component, Path, PathBuf};

/// Name of the project-local storage directory.
pub const STORAGE_DIR_NAME: &str = ".vguard";

/// Get the vguard configuration directory.
///
/// This follows XDG conventions on Linux/macOS:
/// - `$XDG_CONFIG_HOME/vguard` if set
/// - `~/.config/vguard` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("vguard"))
}

/// Get the vguard data directory.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("vguard"))
}

/// Get the project-local storage directory.
pub fn project_storage_dir(project_root: &Path) -> PathBuf {
    project_root.join(STORAGE_DIR_NAME)
}

/// Normalize a path by removing `.` and `..` components.
///
/// Unlike `canonicalize`, this doesn't require the path to exist.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            _ => result.push(component),
        }
    }

    result
}

/// Convert a path under `base` into the `/`-separated relative form used in records.
///
/// Returns `None` if the path is not within the base directory or is not valid UTF-8.
pub fn relative_key(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Resolve a stored relative key against `base`, refusing anything that escapes it.
///
/// Absolute keys, `..` components and empty keys all return `None`.
pub fn safe_join(base: &Path, key: &str) -> Option<PathBuf> {
    if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
        return None;
    }
    let mut result = base.to_path_buf();
    for part in key.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            _ => {}
        }
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => result.push(part),
            _ => return None,
        }
    }
    if result == base {
        None
    } else {
        Some(result)
    }
}

/// Check if a path is within a base directory.
///
/// Symlinks are resolved when both paths exist, so a link pointing outside
/// the base is reported as outside.
pub fn is_within(path: &Path, base: &Path) -> bool {
    match (path.canonicalize(), base.canonicalize()) {
        (Ok(p), Ok(b)) => p.starts_with(&b),
        _ => normalize(path).starts_with(normalize(base)),
    }
}
