//! Content hashing.
//!
//! Every component hashes file bytes through [`content_hash`], so identical
//! content always produces identical digests across snapshots and backups.

use sha2::{Digest, Sha256};

/// Number of leading bytes inspected when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8000;

/// Compute the hex-encoded SHA-256 digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Whether `bytes` should be treated as binary rather than line-oriented text.
///
/// Content is binary if it is not valid UTF-8 or contains a NUL byte in the
/// first few kilobytes.
pub fn is_binary(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    head.contains(&0) || std::str::from_utf8(bytes).is_err()
}
