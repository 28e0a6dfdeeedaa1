//! Configuration management for vguard.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/vguard/config.json`
//! 2. Environment variable: `VGUARD_CONFIG_CONTENT`
//! 3. Project config: `vguard.jsonc` or `vguard.json` in the project directory
//!
//! Supports JSONC (JSON with comments) and variable substitution:
//! - `{env:VAR_NAME}` - Substitute environment variable
//! - `{file:path}` - Substitute file contents

use crate::error::{ConfigError, GuardianResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use vguard_snapshot::RetentionPolicy;
use vguard_util::log::LogLevel;
use vguard_util::path::project_storage_dir;

/// Environment variable holding inline configuration.
pub const CONFIG_CONTENT_ENV: &str = "VGUARD_CONFIG_CONTENT";

/// Confidence below which a conflict resolution needs confirmation.
pub const DEFAULT_CONFLICT_THRESHOLD: f64 = 0.7;

/// Number of entries in the most-changed files ranking.
pub const DEFAULT_TOP_FILES: usize = 10;

/// Static regex for variable substitution, compiled once.
static VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

/// Get the variable substitution regex, compiling it once on first use.
fn var_regex() -> &'static regex::Regex {
    VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\{(env|file):([^}]+)\}")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Main configuration structure.
///
/// Every field is optional so that sources can be layered; the accessor
/// methods apply defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    /// JSON Schema reference.
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Where snapshots, backups and the history log live.
    /// Relative paths are resolved against the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,

    /// Glob patterns excluded from scans (e.g. `target/**`, `*.log`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,

    /// Whether `.gitignore` files are honoured by scans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respect_gitignore: Option<bool>,

    /// Confidence below which a conflict resolution needs confirmation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_threshold: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsConfig>,

    /// Log level.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "log_level_serde",
        default
    )]
    pub log_level: Option<LogLevel>,
}

/// Rollback defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfig {
    /// Take a backup of the working tree before rolling back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<bool>,

    /// Delete files that exist now but are absent from the target snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_untracked: Option<bool>,
}

impl RollbackConfig {
    fn merge(self, other: Self) -> Self {
        Self {
            backup: other.backup.or(self.backup),
            delete_untracked: other.delete_untracked.or(self.delete_untracked),
        }
    }
}

/// Backup defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Gzip each file in new backups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
}

/// Limits for explicit snapshot cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_snapshots: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
}

impl RetentionConfig {
    fn merge(self, other: Self) -> Self {
        Self {
            max_snapshots: other.max_snapshots.or(self.max_snapshots),
            max_age_days: other.max_age_days.or(self.max_age_days),
        }
    }
}

/// Analytics settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Length of the most-changed files ranking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_files: Option<usize>,
}

mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use vguard_util::log::LogLevel;

    pub fn serialize<S: Serializer>(level: &Option<LogLevel>, s: S) -> Result<S::Ok, S::Error> {
        match level {
            Some(level) => s.serialize_str(level.as_str()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<LogLevel>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| {
            LogLevel::parse(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown log level: {s}")))
        })
        .transpose()
    }
}

impl GuardianConfig {
    /// Load configuration from all sources.
    ///
    /// Loading order (later sources override earlier):
    /// 1. Global config from `~/.config/vguard/`
    /// 2. `VGUARD_CONFIG_CONTENT` environment variable
    /// 3. Project config from `project_dir`
    ///
    /// Returns the merged config and the files it was read from.
    pub async fn load(project_dir: Option<&Path>) -> GuardianResult<(Self, Vec<PathBuf>)> {
        let mut config = GuardianConfig::default();
        let mut sources = Vec::new();

        // 1. Load global config
        if let Some(global_dir) = Self::global_config_dir() {
            for name in &["config.json", "vguard.json", "vguard.jsonc"] {
                let path = global_dir.join(name);
                if path.exists() {
                    let loaded = Self::load_file(&path).await?;
                    config = config.merge(loaded);
                    sources.push(path);
                    break;
                }
            }
        }

        // 2. Load from environment variable
        if let Ok(content) = std::env::var(CONFIG_CONTENT_ENV) {
            let loaded = Self::parse_jsonc(&content, "<env>")?;
            config = config.merge(loaded);
        }

        // 3. Load project config
        if let Some(dir) = project_dir {
            for name in &["vguard.jsonc", "vguard.json"] {
                let path = dir.join(name);
                if path.exists() {
                    let loaded = Self::load_file(&path).await?;
                    config = config.merge(loaded);
                    sources.push(path);
                    break;
                }
            }
        }

        tracing::debug!(sources = ?sources, "Loaded configuration");
        Ok((config, sources))
    }

    /// Get the global config directory.
    ///
    /// On Unix systems, prefers `~/.config/vguard` (XDG standard) over
    /// the platform-specific directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        #[cfg(unix)]
        {
            if let Some(home) = dirs::home_dir() {
                let xdg_config = home.join(".config").join("vguard");
                if xdg_config.exists() {
                    return Some(xdg_config);
                }
            }
        }

        vguard_util::path::config_dir()
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> GuardianResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let content = Self::substitute_variables(&content, path)?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Save configuration to `{project_dir}/vguard.json`, or to the global
    /// config directory when no project is given.
    pub async fn save(&self, project_dir: Option<&Path>) -> GuardianResult<()> {
        let path = if let Some(dir) = project_dir {
            dir.join("vguard.json")
        } else {
            let global_dir = Self::global_config_dir().ok_or_else(|| {
                ConfigError::InvalidPath("Could not determine config directory".to_string())
            })?;

            // Ensure directory exists
            tokio::fs::create_dir_all(&global_dir).await?;
            global_dir.join("config.json")
        };

        // Serialize to pretty JSON
        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::InvalidJson {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tokio::fs::write(&path, content).await?;
        tracing::info!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Parse JSONC (JSON with comments).
    fn parse_jsonc(content: &str, source: &str) -> GuardianResult<Self> {
        // Strip comments (// and /* */)
        let stripped = Self::strip_comments(content);

        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Strip JSON comments.
    fn strip_comments(input: &str) -> String {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();
        let mut in_string = false;
        let mut escape_next = false;

        while let Some(c) = chars.next() {
            if escape_next {
                result.push(c);
                escape_next = false;
                continue;
            }

            if c == '\\' && in_string {
                result.push(c);
                escape_next = true;
                continue;
            }

            if c == '"' {
                in_string = !in_string;
                result.push(c);
                continue;
            }

            if in_string {
                result.push(c);
                continue;
            }

            if c == '/' {
                match chars.peek() {
                    Some('/') => {
                        chars.next();
                        for c in chars.by_ref() {
                            if c == '\n' {
                                result.push('\n');
                                break;
                            }
                        }
                        continue;
                    }
                    Some('*') => {
                        chars.next();
                        let mut prev = ' ';
                        for c in chars.by_ref() {
                            if prev == '*' && c == '/' {
                                break;
                            }
                            // Keep line numbers stable for parse errors
                            if c == '\n' {
                                result.push('\n');
                            }
                            prev = c;
                        }
                        continue;
                    }
                    _ => {}
                }
            }

            result.push(c);
        }

        result
    }

    /// Substitute `{env:NAME}` and `{file:path}` placeholders.
    ///
    /// File references are resolved relative to the config file.
    fn substitute_variables(content: &str, config_path: &Path) -> GuardianResult<String> {
        let re = var_regex();
        let config_dir = config_path.parent().unwrap_or(Path::new("."));

        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let (Some(full_match), Some(kind), Some(value)) = (cap.get(0), cap.get(1), cap.get(2))
            else {
                continue;
            };
            let value = value.as_str();

            let replacement = match kind.as_str() {
                "env" => std::env::var(value).map_err(|_| ConfigError::EnvVarNotFound {
                    name: value.to_string(),
                })?,
                "file" => {
                    let file_path = config_dir.join(value);
                    std::fs::read_to_string(&file_path)
                        .map(|v| v.trim().to_string())
                        .map_err(|_| ConfigError::FileRefNotFound {
                            path: file_path.display().to_string(),
                        })?
                }
                _ => continue,
            };

            result = result.replace(full_match.as_str(), &replacement);
        }

        Ok(result)
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(mut self, other: Self) -> Self {
        if other.schema.is_some() {
            self.schema = other.schema;
        }
        if other.storage_dir.is_some() {
            self.storage_dir = other.storage_dir;
        }
        if other.ignore.is_some() {
            self.ignore = other.ignore;
        }
        if other.respect_gitignore.is_some() {
            self.respect_gitignore = other.respect_gitignore;
        }
        if other.conflict_threshold.is_some() {
            self.conflict_threshold = other.conflict_threshold;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }

        // Nested structs - merge field by field
        self.rollback = match (self.rollback, other.rollback) {
            (Some(base), Some(other)) => Some(base.merge(other)),
            (base, None) => base,
            (None, other) => other,
        };
        self.retention = match (self.retention, other.retention) {
            (Some(base), Some(other)) => Some(base.merge(other)),
            (base, None) => base,
            (None, other) => other,
        };
        self.backup = merge_option(self.backup, other.backup);
        self.analytics = merge_option(self.analytics, other.analytics);

        self
    }

    /// Resolved storage directory for a project.
    pub fn storage_dir(&self, project_root: &Path) -> PathBuf {
        match &self.storage_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => project_root.join(dir),
            None => project_storage_dir(project_root),
        }
    }

    pub fn ignore_patterns(&self) -> &[String] {
        self.ignore.as_deref().unwrap_or_default()
    }

    pub fn respect_gitignore(&self) -> bool {
        self.respect_gitignore.unwrap_or(true)
    }

    /// Conflict confidence threshold, clamped to `[0, 1]`.
    pub fn conflict_threshold(&self) -> f64 {
        match self.conflict_threshold {
            Some(t) if t.is_nan() => DEFAULT_CONFLICT_THRESHOLD,
            Some(t) => t.clamp(0.0, 1.0),
            None => DEFAULT_CONFLICT_THRESHOLD,
        }
    }

    pub fn rollback_backup(&self) -> bool {
        self.rollback
            .as_ref()
            .and_then(|r| r.backup)
            .unwrap_or(true)
    }

    pub fn rollback_delete_untracked(&self) -> bool {
        self.rollback
            .as_ref()
            .and_then(|r| r.delete_untracked)
            .unwrap_or(true)
    }

    pub fn backup_compress(&self) -> bool {
        self.backup
            .as_ref()
            .and_then(|b| b.compress)
            .unwrap_or(false)
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        let retention = self.retention.clone().unwrap_or_default();
        RetentionPolicy {
            max_snapshots: retention.max_snapshots,
            max_age_days: retention.max_age_days,
        }
    }

    pub fn top_files(&self) -> usize {
        self.analytics
            .as_ref()
            .and_then(|a| a.top_files)
            .unwrap_or(DEFAULT_TOP_FILES)
    }
}

/// Merge two Option values.
fn merge_option<T>(base: Option<T>, other: Option<T>) -> Option<T> {
    match (base, other) {
        (_, Some(o)) => Some(o),
        (b, None) => b,
    }
}
