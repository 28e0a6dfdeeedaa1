//! Logging setup using tracing.
//!
//! The vguard crates only emit `tracing` events; installing a subscriber is
//! left to the host. Hosts without their own setup can call [`init`].

use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Whether to print logs to stderr.
    pub print: bool,
    /// Log level used when `RUST_LOG` is not set.
    pub level: LogLevel,
    /// Whether to include file/line info in logs.
    pub include_location: bool,
}

impl LogConfig {
    /// Build the filter directive for this configuration.
    ///
    /// The engine's own crates log at `level`; everything else stays at `warn`.
    pub fn directive(&self) -> String {
        let level = self.level.as_str();
        format!(
            "warn,vguard_core={level},vguard_snapshot={level},vguard_storage={level},vguard_util={level}"
        )
    }
}

/// Initialize logging with the given configuration.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(config: LogConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.directive()));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.print {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location);

        subscriber.with(fmt_layer).try_init().is_ok()
    } else {
        subscriber.try_init().is_ok()
    }
}

/// Get the default log file path.
pub fn default_log_path() -> Option<PathBuf> {
    crate::path::data_dir().map(|p| p.join("logs").join("vguard.log"))
}
