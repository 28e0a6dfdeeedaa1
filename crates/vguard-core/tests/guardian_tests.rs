//! End-to-end behaviour of the version guardian on real project trees.

use vguard_core::{
    GuardianConfig, GuardianError, RestoreOptions, RollbackOptions, VersionGuardian,
};
use vguard_snapshot::{DiffChange, FileContent};
use vguard_test_utils::assertions::{assert_file_equals, assert_tree_matches};
use vguard_test_utils::fixtures::{content, BuiltTestProject, TestProject};
use vguard_test_utils::RecordingProgress;
use vguard_util::content_hash;

fn open(project: &BuiltTestProject) -> VersionGuardian {
    VersionGuardian::open(project.path(), GuardianConfig::default()).unwrap()
}

fn three_file_project() -> BuiltTestProject {
    TestProject::new()
        .with_lines("a.ts", 10)
        .with_lines("b.ts", 5)
        .with_lines("c.ts", 20)
        .build()
}

#[tokio::test]
async fn test_snapshot_records_fresh_hashes() {
    let project = three_file_project();
    let guardian = open(&project);

    guardian
        .create_snapshot("before-refactor", None)
        .await
        .unwrap();

    let snapshots = guardian.list_snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 1);
    let snapshot = &snapshots[0];
    assert_eq!(snapshot.name, "before-refactor");
    assert_eq!(snapshot.files.len(), 3);
    for file in &snapshot.files {
        assert_eq!(file.hash, content_hash(&project.read_bytes(&file.path)));
    }
    // Stored under the default storage directory.
    assert!(project
        .path()
        .join(".vguard/snapshots")
        .join(format!("{}.json", snapshot.id))
        .exists());
}

#[tokio::test]
async fn test_rollback_reverts_edit_and_backs_up_once() {
    let project = three_file_project();
    let guardian = open(&project);
    let snapshot = guardian
        .create_snapshot("before-refactor", None)
        .await
        .unwrap();

    project.edit_line("b.ts", 3, "edited");
    let edited = project.read_file("b.ts");

    let report = guardian
        .rollback(&snapshot.id, RollbackOptions::default())
        .await
        .unwrap();

    assert_eq!(report.written, vec!["b.ts"]);
    assert_file_equals(&project.path().join("b.ts"), &content::numbered_lines(5));

    let backups = guardian.list_backups().await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(report.backup_id.as_deref(), Some(backups[0].id.as_str()));
    assert_file_equals(&backups[0].path.join("files/b.ts"), &edited);
}

#[tokio::test]
async fn test_rollback_without_backup_creates_none() {
    let project = three_file_project();
    let guardian = open(&project);
    let snapshot = guardian.create_snapshot("s", None).await.unwrap();
    project.edit_line("a.ts", 1, "x");

    let options = RollbackOptions {
        backup: false,
        ..guardian.rollback_options()
    };
    let report = guardian.rollback(&snapshot.id, options).await.unwrap();

    assert!(report.backup_id.is_none());
    assert!(guardian.list_backups().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rollback_reproduces_snapshot_exactly() {
    let project = TestProject::new()
        .with_file("src/lib.rs", "pub fn f() {}\n")
        .with_file("docs/guide.md", "# Guide\n")
        .with_bytes("assets/logo.png", content::BINARY)
        .build();
    let guardian = open(&project);
    let snapshot = guardian.create_snapshot("base", None).await.unwrap();

    project.write_file("src/lib.rs", "pub fn f() { todo!() }\n");
    project.write_file("assets/logo.png", b"replaced");
    project.delete_file("docs/guide.md");
    project.write_file("src/extra.rs", "// created later\n");
    project.write_file("scratch/deep/tmp.txt", "tmp");

    let report = guardian
        .rollback(&snapshot.id, guardian.rollback_options())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.deleted, vec!["scratch/deep/tmp.txt", "src/extra.rs"]);
    assert_tree_matches(&project.tree(), &snapshot);
    assert!(!project.file_exists("scratch"));
}

#[tokio::test]
async fn test_rollback_to_unknown_snapshot_changes_nothing() {
    let project = three_file_project();
    let guardian = open(&project);
    let before = project.tree();

    let err = guardian
        .rollback(&"snp_unknown".into(), RollbackOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, GuardianError::NotFound { .. }));
    assert!(guardian.list_backups().await.unwrap().is_empty());
    assert!(guardian.get_history(None).await.unwrap().is_empty());
    assert_eq!(project.tree(), before);
}

#[tokio::test]
async fn test_diff_reports_inserted_line() {
    let project = three_file_project();
    let guardian = open(&project);
    let first = guardian.create_snapshot("one", None).await.unwrap();

    let mut lines: Vec<String> = project.read_file("a.ts").lines().map(String::from).collect();
    lines.insert(4, "inserted".to_string());
    project.write_file("a.ts", lines.join("\n") + "\n");
    let second = guardian.create_snapshot("two", None).await.unwrap();

    let diffs = guardian.diff(&first.id, &second.id).await.unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].path(), "a.ts");
    assert_eq!(diffs[0].additions(), 1);
    assert_eq!(diffs[0].deletions(), 0);
    assert_eq!(
        diffs[0].changes(),
        &[DiffChange::Add {
            line: 5,
            new: "inserted".to_string()
        }]
    );

    let reverse = guardian.diff(&second.id, &first.id).await.unwrap();
    assert_eq!(reverse[0].deletions(), 1);
    assert!(guardian.diff(&first.id, &first.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_detect_conflict_spanning_insertion() {
    let project = TestProject::new().build();
    let guardian = open(&project);

    let ancestor = content::numbered_lines(12);
    let mut x: Vec<String> = ancestor.lines().map(String::from).collect();
    x.splice(9..9, ["new a", "new b", "new c"].map(String::from));
    let mut y: Vec<String> = ancestor.lines().map(String::from).collect();
    y[10] = "changed 11".to_string();

    let conflicts =
        guardian.detect_conflicts(&ancestor, &(x.join("\n") + "\n"), &(y.join("\n") + "\n"));
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].start_line, 10);
    assert_eq!(conflicts[0].end_line, 12);
}

#[tokio::test]
async fn test_history_and_analytics_after_rollbacks() {
    let project = three_file_project();
    let guardian = open(&project);

    let mut ids = Vec::new();
    for i in 0..5 {
        project.write_file("c.ts", format!("revision {i}\n"));
        ids.push(guardian.create_snapshot(format!("s{i}"), None).await.unwrap().id);
    }
    guardian
        .rollback(&ids[1], RollbackOptions::default())
        .await
        .unwrap();
    guardian
        .rollback(&ids[3], RollbackOptions::default())
        .await
        .unwrap();

    let analytics = guardian.get_analytics().await.unwrap();
    assert_eq!(analytics.total_snapshots, 5);
    assert_eq!(
        analytics.total_snapshots,
        guardian.list_snapshots().await.unwrap().len()
    );
    assert_eq!(analytics.total_backups, 2);
    assert_eq!(analytics.size_growth.len(), 5);
    assert_eq!(analytics.most_changed[0].path, "c.ts");

    let history = guardian.get_history(None).await.unwrap();
    assert!(history.len() >= 7);
    assert_eq!(history.len(), 9);
    assert_eq!(guardian.get_history(Some(2)).await.unwrap(), history[7..].to_vec());

    // Nothing written in between, so recomputing gives the same answer.
    assert_eq!(guardian.get_analytics().await.unwrap(), analytics);
}

#[tokio::test]
async fn test_backup_restore_roundtrip_compressed() {
    let project = TestProject::new()
        .with_file("a.txt", "alpha\n")
        .with_bytes("b.bin", content::BINARY)
        .build();
    let guardian = open(&project);

    let mut options = guardian.backup_options();
    options.compress = true;
    let backup = guardian
        .create_backup(Some("manual".into()), options)
        .await
        .unwrap();
    assert!(backup.compressed);
    assert_eq!(backup.file_count, 2);

    project.write_file("a.txt", "broken\n");
    project.delete_file("b.bin");
    project.write_file("later.txt", "new\n");

    let report = guardian
        .restore_backup(&backup.id, RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(report.written, vec!["a.txt", "b.bin"]);
    assert_eq!(project.read_bytes("b.bin"), content::BINARY);
    assert!(project.file_exists("later.txt"));

    let events: Vec<_> = guardian
        .get_history(None)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.event)
        .collect();
    assert_eq!(events, vec!["backup.created", "backup.restored"]);
}

#[tokio::test]
async fn test_delete_snapshot() {
    let project = three_file_project();
    let guardian = open(&project);
    let snapshot = guardian.create_snapshot("s", None).await.unwrap();

    guardian.delete_snapshot(&snapshot.id).await.unwrap();
    assert!(guardian.list_snapshots().await.unwrap().is_empty());
    assert!(matches!(
        guardian.get_snapshot(&snapshot.id).await,
        Err(GuardianError::NotFound { .. })
    ));
    assert!(matches!(
        guardian.delete_snapshot(&snapshot.id).await,
        Err(GuardianError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_corrupt_snapshot_is_reported_with_its_id() {
    let project = three_file_project();
    let guardian = open(&project);
    let snapshot = guardian.create_snapshot("s", None).await.unwrap();

    let record = project
        .path()
        .join(".vguard/snapshots")
        .join(format!("{}.json", snapshot.id));
    std::fs::write(&record, "{ not json").unwrap();

    match guardian.get_snapshot(&snapshot.id).await.unwrap_err() {
        GuardianError::Validation { id, .. } => assert_eq!(id, snapshot.id.as_str()),
        other => panic!("unexpected error: {other:?}"),
    }
    // Left as found.
    assert_eq!(std::fs::read_to_string(&record).unwrap(), "{ not json");
}

#[tokio::test]
async fn test_config_file_drives_ignore_and_storage() {
    let project = TestProject::new()
        .with_config(
            r#"{
                // JSONC comments are allowed
                "storage_dir": "history",
                "ignore": ["*.log", "build"],
                "rollback": { "delete_untracked": false }
            }"#,
        )
        .with_file("src/main.rs", "fn main() {}\n")
        .with_file("debug.log", "noise")
        .with_file("build/out.o", "obj")
        .build();

    let guardian = VersionGuardian::load(project.path()).await.unwrap();
    assert_eq!(guardian.storage_dir(), project.path().join("history"));

    let snapshot = guardian.create_snapshot("s", None).await.unwrap();
    let paths: Vec<_> = snapshot.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["src/main.rs", "vguard.json"]);

    project.write_file("untracked.txt", "stay");
    guardian
        .rollback(&snapshot.id, guardian.rollback_options())
        .await
        .unwrap();
    assert!(project.file_exists("untracked.txt"));
}

#[tokio::test]
async fn test_progress_reaches_total() {
    let project = three_file_project();
    let progress = std::sync::Arc::new(RecordingProgress::new());
    let guardian = VersionGuardian::builder(project.path())
        .progress(progress.clone())
        .build()
        .unwrap();

    guardian.create_snapshot("s", None).await.unwrap();
    assert_eq!(progress.calls(), vec![(1, 3), (2, 3), (3, 3)]);
}

#[tokio::test]
async fn test_version_classifies_changes() {
    let project = three_file_project();
    let guardian = open(&project);
    guardian.create_snapshot("one", None).await.unwrap();

    project.edit_line("a.ts", 1, "changed");
    project.delete_file("b.ts");
    project.write_file("d.ts", "new\n");
    let second = guardian.create_snapshot("two", None).await.unwrap();

    let version = guardian.version(&second.id).await.unwrap();
    let kinds: Vec<_> = version
        .changes
        .iter()
        .map(|c| (c.path.as_str(), c.kind.label()))
        .collect();
    assert_eq!(
        kinds,
        vec![("a.ts", "modified"), ("b.ts", "deleted"), ("d.ts", "added")]
    );
    assert_eq!(
        version.changes[2].new_content(),
        Some(&FileContent::Text("new\n".to_string()))
    );
}
