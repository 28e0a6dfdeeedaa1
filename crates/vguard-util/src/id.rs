//! ULID-based identifier generation with prefixes.
//!
//! Identifiers in vguard follow the pattern: `prefix_ulid`
//! For example: `snp_01hqxyz...` for snapshots.
//!
//! A ULID is a 48-bit millisecond timestamp followed by 80 random bits, so
//! identifiers sort by creation time and two records created in the same
//! millisecond still get distinct ids.

use ulid::Ulid;

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Snapshot,
    Backup,
    Version,
}

impl IdPrefix {
    /// Get the string prefix for this identifier type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Snapshot => "snp",
            IdPrefix::Backup => "bak",
            IdPrefix::Version => "ver",
        }
    }

    /// Parse a prefix from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "snp" => Some(IdPrefix::Snapshot),
            "bak" => Some(IdPrefix::Backup),
            "ver" => Some(IdPrefix::Version),
            _ => None,
        }
    }
}

/// Identifier generation and parsing utilities.
pub struct Identifier;

impl Identifier {
    /// Generate a new ascending identifier (newer = larger).
    pub fn ascending(prefix: IdPrefix) -> String {
        Self::with_ulid(prefix, Ulid::new())
    }

    /// Generate an identifier with a specific ULID (for testing or imports).
    pub fn with_ulid(prefix: IdPrefix, ulid: Ulid) -> String {
        format!("{}_{}", prefix.as_str(), ulid.to_string().to_lowercase())
    }

    /// Parse an identifier into its prefix and ULID parts.
    pub fn parse(id: &str) -> Option<(IdPrefix, Ulid)> {
        let (prefix, rest) = id.split_once('_')?;
        let prefix = IdPrefix::parse(prefix)?;
        let ulid = Ulid::from_string(rest).ok()?;
        Some((prefix, ulid))
    }

    /// Check if an identifier has the expected prefix.
    pub fn has_prefix(id: &str, prefix: IdPrefix) -> bool {
        id.starts_with(prefix.as_str()) && id.chars().nth(prefix.as_str().len()) == Some('_')
    }

    /// Check that an identifier is safe to use as a single storage key component.
    ///
    /// Only `[a-z0-9_-]` is accepted, which rules out path separators and `..`.
    pub fn is_valid(id: &str) -> bool {
        !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    }

    /// Generate a snapshot ID.
    pub fn snapshot() -> String {
        Self::ascending(IdPrefix::Snapshot)
    }

    /// Generate a backup ID.
    pub fn backup() -> String {
        Self::ascending(IdPrefix::Backup)
    }

    /// Generate a version ID.
    pub fn version() -> String {
        Self::ascending(IdPrefix::Version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ascending_id() {
        let id = Identifier::ascending(IdPrefix::Snapshot);
        assert!(id.starts_with("snp_"));
        assert_eq!(id.len(), 30); // "snp_" (4) + ULID (26)
    }

    #[test]
    fn test_ascending_order() {
        let id1 = Identifier::snapshot();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = Identifier::snapshot();
        assert!(id1 < id2, "Ascending IDs should increase over time");
    }

    #[test]
    fn test_ids_do_not_collide_within_a_millisecond() {
        let ids: HashSet<String> = (0..1000).map(|_| Identifier::backup()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_parse_id() {
        let id = Identifier::backup();
        let (prefix, _ulid) = Identifier::parse(&id).unwrap();
        assert_eq!(prefix, IdPrefix::Backup);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Identifier::parse("nounderscore").is_none());
        assert!(Identifier::parse("xyz_01HQXYZ").is_none());
        assert!(Identifier::parse("snp_notaulid").is_none());
    }

    #[test]
    fn test_has_prefix() {
        let id = Identifier::snapshot();
        assert!(Identifier::has_prefix(&id, IdPrefix::Snapshot));
        assert!(!Identifier::has_prefix(&id, IdPrefix::Backup));
        assert!(!Identifier::has_prefix("snp123", IdPrefix::Snapshot));
    }

    #[test]
    fn test_with_ulid_roundtrips() {
        let ulid = Ulid::new();
        let id = Identifier::with_ulid(IdPrefix::Version, ulid);
        assert!(id.starts_with("ver_"));
        let (_, parsed) = Identifier::parse(&id).unwrap();
        assert_eq!(parsed, ulid);
    }

    #[test]
    fn test_is_valid() {
        assert!(Identifier::is_valid(&Identifier::snapshot()));
        assert!(!Identifier::is_valid(""));
        assert!(!Identifier::is_valid("../etc"));
        assert!(!Identifier::is_valid("a/b"));
        assert!(!Identifier::is_valid("Upper"));
    }
}
