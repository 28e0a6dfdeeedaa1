//! Progress reporter that remembers what it was told.

use std::sync::Mutex;
use vguard_snapshot::ProgressReporter;

/// Records every `(processed, total)` callback in order.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    calls: Mutex<Vec<(usize, usize)>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// The last callback, if any.
    pub fn last(&self) -> Option<(usize, usize)> {
        self.calls().last().copied()
    }
}

impl ProgressReporter for RecordingProgress {
    fn on_progress(&self, processed: usize, total: usize) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((processed, total));
        }
    }
}
