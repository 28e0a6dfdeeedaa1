//! Test fixtures and assertions for vguard.
//!
//! - **Fixtures**: temporary project trees built from a few lines of setup
//! - **Assertions**: file and tree comparisons with readable diffs on failure
//! - **Progress**: a [`ProgressReporter`](vguard_snapshot::ProgressReporter)
//!   that records every callback
//!
//! # Example Usage
//!
//! ```rust
//! use vguard_test_utils::{assertions::assert_file_equals, fixtures::TestProject};
//!
//! let project = TestProject::new()
//!     .with_file("src/main.rs", "fn main() {}\n")
//!     .with_lines("notes.txt", 3)
//!     .build();
//!
//! assert_file_equals(&project.path().join("notes.txt"), "line 1\nline 2\nline 3\n");
//! ```

pub mod assertions;
pub mod fixtures;
pub mod progress;

pub use fixtures::{BuiltTestProject, TestProject};
pub use progress::RecordingProgress;
