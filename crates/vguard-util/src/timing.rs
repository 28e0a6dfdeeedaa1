//! RAII-based timing for engine operations.
//!
//! # Example
//!
//! ```rust,ignore
//! use vguard_util::timing::TimingGuard;
//!
//! async fn rollback(id: &str) {
//!     let _timing = TimingGuard::rollback(id);
//!     // ... restore files ...
//!     // Duration is logged when _timing is dropped
//! }
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// RAII guard that measures and logs the duration of an operation.
///
/// When dropped, logs the elapsed time since creation with the operation
/// kind and target as structured fields.
pub struct TimingGuard {
    /// Kind of operation (e.g., "scan", "backup", "rollback")
    operation: &'static str,
    /// What the operation acted on (a snapshot id, a backup name, a root path)
    target: String,
    start: Instant,
    info_threshold_ms: u64,
    warn_threshold_ms: u64,
}

impl TimingGuard {
    /// Create a new timing guard.
    pub fn new(operation: &'static str, target: impl Into<String>) -> Self {
        let target = target.into();
        debug!(operation, target = %target, "Starting operation");
        Self {
            operation,
            target,
            start: Instant::now(),
            info_threshold_ms: 100,
            warn_threshold_ms: 5000,
        }
    }

    /// Timing guard for a working-tree scan.
    pub fn scan(root: impl Into<String>) -> Self {
        Self::new("scan", root)
    }

    /// Timing guard for creating a backup.
    pub fn backup(name: impl Into<String>) -> Self {
        Self::new("backup", name)
    }

    /// Timing guard for a rollback to a snapshot.
    pub fn rollback(snapshot_id: impl Into<String>) -> Self {
        Self::new("rollback", snapshot_id)
    }

    /// Timing guard for restoring a backup.
    pub fn restore(backup_id: impl Into<String>) -> Self {
        Self::new("restore", backup_id)
    }

    /// Set the threshold for info-level logging (in milliseconds).
    pub fn with_info_threshold(mut self, ms: u64) -> Self {
        self.info_threshold_ms = ms;
        self
    }

    /// Set the threshold for warn-level logging (in milliseconds).
    pub fn with_warn_threshold(mut self, ms: u64) -> Self {
        self.warn_threshold_ms = ms;
        self
    }

    /// Get the elapsed time so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Render a duration the way operators read it: `850ms`, `2.40s`, `3m 12.0s`.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        let mins = ms / 60_000;
        let secs = (ms % 60_000) as f64 / 1000.0;
        format!("{mins}m {secs:.1}s")
    }
}

impl Drop for TimingGuard {
    #[allow(clippy::cognitive_complexity)]
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let duration_ms = duration.as_millis() as u64;
        let duration_str = format_duration(duration);

        if duration_ms >= self.warn_threshold_ms {
            warn!(
                operation = self.operation,
                target = %self.target,
                duration_ms,
                duration = %duration_str,
                "Slow operation completed"
            );
        } else if duration_ms >= self.info_threshold_ms {
            info!(
                operation = self.operation,
                target = %self.target,
                duration_ms,
                duration = %duration_str,
                "Operation completed"
            );
        } else {
            debug!(
                operation = self.operation,
                target = %self.target,
                duration_ms,
                duration = %duration_str,
                "Operation completed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_timing_guard_measures() {
        let guard = TimingGuard::scan("/tmp/project");
        sleep(Duration::from_millis(10));
        assert!(guard.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_timing_guard_thresholds() {
        let guard = TimingGuard::rollback("snp_1")
            .with_info_threshold(0)
            .with_warn_threshold(1);
        sleep(Duration::from_millis(2));
        drop(guard);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(2400)), "2.40s");
        assert_eq!(format_duration(Duration::from_millis(192_000)), "3m 12.0s");
    }
}
