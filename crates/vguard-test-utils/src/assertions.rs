//! Assertion helpers with readable failure output.

use std::collections::BTreeMap;
use std::path::Path;
use vguard_snapshot::Snapshot;

/// Assert that a file's content equals expected text exactly.
pub fn assert_file_equals(path: &Path, expected: &str) {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read file {}: {}", path.display(), e));

    if content != expected {
        panic!(
            "File {} content does not match expected.\nDiff:\n{}",
            path.display(),
            line_diff(expected, &content)
        );
    }
}

/// Assert that two strings are equal, with a nice diff on failure.
pub fn assert_strings_equal(actual: &str, expected: &str) {
    if actual != expected {
        panic!("Strings are not equal.\nDiff:\n{}", line_diff(expected, actual));
    }
}

/// Assert that `tree` holds exactly the files of `snapshot`, byte for byte.
pub fn assert_tree_matches(tree: &BTreeMap<String, Vec<u8>>, snapshot: &Snapshot) {
    let expected: BTreeMap<&str, Vec<u8>> = snapshot
        .files
        .iter()
        .map(|f| {
            let bytes = f
                .content
                .to_bytes()
                .unwrap_or_else(|| panic!("Snapshot file {} has undecodable content", f.path));
            (f.path.as_str(), bytes)
        })
        .collect();

    let actual_paths: Vec<&str> = tree.keys().map(String::as_str).collect();
    let expected_paths: Vec<&str> = expected.keys().copied().collect();
    assert_eq!(
        actual_paths, expected_paths,
        "Working tree paths differ from snapshot {}",
        snapshot.id
    );

    for (path, bytes) in &expected {
        if tree.get(*path) != Some(bytes) {
            match (std::str::from_utf8(bytes), tree.get(*path).map(|b| std::str::from_utf8(b))) {
                (Ok(want), Some(Ok(got))) => panic!(
                    "File {} differs from snapshot {}.\nDiff:\n{}",
                    path,
                    snapshot.id,
                    line_diff(want, got)
                ),
                _ => panic!("Binary file {} differs from snapshot {}", path, snapshot.id),
            }
        }
    }
}

/// Assert that a result is Err and extract the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    };
    ($expr:expr, $msg:literal) => {
        match $expr {
            Ok(value) => panic!("{}: {:?}", $msg, value),
            Err(e) => e,
        }
    };
}

fn line_diff(expected: &str, actual: &str) -> String {
    let diff = similar::TextDiff::from_lines(expected, actual);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => "-",
            similar::ChangeTag::Insert => "+",
            similar::ChangeTag::Equal => " ",
        };
        output.push_str(&format!("{}{}", sign, change));
    }
    output
}
