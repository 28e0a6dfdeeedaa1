//! Shared utilities for vguard.
//!
//! This crate provides common utilities used across the vguard workspace:
//! - ULID-based identifiers for snapshots, backups and versions
//! - Content hashing shared by every component that compares file bytes
//! - Logging setup with tracing
//! - Path utilities that keep writes inside the project root
//! - RAII-based timing for scans, backups and rollbacks

pub mod hash;
pub mod id;
pub mod log;
pub mod path;
pub mod timing;

pub use hash::{content_hash, is_binary};
pub use id::{IdPrefix, Identifier};
pub use timing::TimingGuard;
