//! Single-flight behaviour of mutating operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vguard_core::{GuardianError, ProgressReporter, RollbackOptions, VersionGuardian};
use vguard_test_utils::fixtures::TestProject;

/// Parks the first scan that reports progress until released.
struct Gate {
    armed: AtomicBool,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl ProgressReporter for Gate {
    fn on_progress(&self, _processed: usize, _total: usize) {
        if self.armed.swap(false, Ordering::SeqCst) {
            if let Ok(entered) = self.entered.lock() {
                let _ = entered.send(());
            }
            if let Ok(release) = self.release.lock() {
                let _ = release.recv_timeout(Duration::from_secs(10));
            }
        }
    }
}

struct Parked {
    gate: Arc<Gate>,
    entered: Receiver<()>,
    release: Sender<()>,
}

fn parked() -> Parked {
    let (entered_tx, entered_rx) = channel();
    let (release_tx, release_rx) = channel();
    Parked {
        gate: Arc::new(Gate {
            armed: AtomicBool::new(false),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        }),
        entered: entered_rx,
        release: release_tx,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_mutation_is_rejected() {
    let project = TestProject::new()
        .with_lines("a.ts", 10)
        .with_lines("b.ts", 5)
        .build();
    let parked = parked();
    let guardian = Arc::new(
        VersionGuardian::builder(project.path())
            .progress(parked.gate.clone())
            .build()
            .unwrap(),
    );
    let base = guardian.create_snapshot("base", None).await.unwrap();

    parked.gate.armed.store(true, Ordering::SeqCst);
    let first = {
        let guardian = guardian.clone();
        tokio::spawn(async move { guardian.create_snapshot("slow", None).await })
    };
    let entered = parked.entered;
    tokio::task::spawn_blocking(move || entered.recv_timeout(Duration::from_secs(10)))
        .await
        .unwrap()
        .expect("first snapshot never started scanning");

    assert_eq!(guardian.in_flight(), Some("create snapshot"));

    let backup = guardian.create_backup(None, guardian.backup_options()).await;
    match backup {
        Err(GuardianError::ConcurrencyRejected {
            operation,
            in_flight,
        }) => {
            assert_eq!(operation, "create backup");
            assert_eq!(in_flight, "create snapshot");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(matches!(
        guardian
            .rollback(&base.id, RollbackOptions::default())
            .await,
        Err(GuardianError::ConcurrencyRejected { .. })
    ));
    assert!(matches!(
        guardian.delete_snapshot(&base.id).await,
        Err(GuardianError::ConcurrencyRejected { .. })
    ));

    parked.release.send(()).unwrap();
    let slow = first.await.unwrap().unwrap();
    assert_eq!(slow.name, "slow");
    assert!(guardian.in_flight().is_none());

    // Rejected calls left no trace.
    assert!(guardian.list_backups().await.unwrap().is_empty());
    assert_eq!(guardian.list_snapshots().await.unwrap().len(), 2);
    assert_eq!(guardian.get_history(None).await.unwrap().len(), 2);

    // And the gate is free again.
    guardian
        .create_backup(None, guardian.backup_options())
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reads_wait_for_mutation() {
    let project = TestProject::new().with_lines("a.ts", 3).build();
    let parked = parked();
    let guardian = Arc::new(
        VersionGuardian::builder(project.path())
            .progress(parked.gate.clone())
            .build()
            .unwrap(),
    );

    parked.gate.armed.store(true, Ordering::SeqCst);
    let writer = {
        let guardian = guardian.clone();
        tokio::spawn(async move { guardian.create_snapshot("slow", None).await })
    };
    let entered = parked.entered;
    tokio::task::spawn_blocking(move || entered.recv_timeout(Duration::from_secs(10)))
        .await
        .unwrap()
        .unwrap();

    let reader = {
        let guardian = guardian.clone();
        tokio::spawn(async move { guardian.list_snapshots().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!reader.is_finished());

    parked.release.send(()).unwrap();
    writer.await.unwrap().unwrap();
    // The reader sees the finished snapshot, never a half-built one.
    assert_eq!(reader.await.unwrap().unwrap().len(), 1);
}
