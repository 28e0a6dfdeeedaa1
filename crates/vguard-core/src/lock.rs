//! Project-scoped single-flight gate.
//!
//! Mutating operations take an exclusive permit and are rejected, never
//! queued, while another one holds it. Readers share a read lock that
//! excludes them while a mutation is in progress.

use crate::error::{GuardianError, GuardianResult};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockWriteGuard, RwLock, RwLockReadGuard};
use tracing::debug;

/// Coordinates mutating and read-only operations on one project.
#[derive(Debug, Default)]
pub struct OperationGate {
    /// Held for the whole duration of a mutating operation.
    single_flight: Arc<Mutex<()>>,
    /// Write side held by the mutation, read side by readers.
    data: Arc<RwLock<()>>,
    /// Name of the mutation currently in flight, for error messages.
    holder: Arc<StdMutex<Option<&'static str>>>,
}

/// Names the in-flight mutation until dropped.
#[derive(Debug)]
struct HolderName(Arc<StdMutex<Option<&'static str>>>);

impl HolderName {
    fn set(holder: &Arc<StdMutex<Option<&'static str>>>, operation: &'static str) -> Self {
        if let Ok(mut name) = holder.lock() {
            *name = Some(operation);
        }
        Self(holder.clone())
    }
}

impl Drop for HolderName {
    fn drop(&mut self) {
        if let Ok(mut name) = self.0.lock() {
            *name = None;
        }
    }
}

/// Exclusive permit for one mutating operation.
#[derive(Debug)]
pub struct MutationPermit {
    // Cleared before the single-flight guard is released.
    _holder: HolderName,
    _write: OwnedRwLockWriteGuard<()>,
    _single_flight: OwnedMutexGuard<()>,
    operation: &'static str,
}

impl Drop for MutationPermit {
    fn drop(&mut self) {
        debug!(operation = self.operation, "Released mutation permit");
    }
}

impl OperationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a mutating operation, or fail if one is already running.
    pub async fn begin_mutation(&self, operation: &'static str) -> GuardianResult<MutationPermit> {
        let single_flight = match self.single_flight.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                let in_flight = self
                    .holder
                    .lock()
                    .ok()
                    .and_then(|h| *h)
                    .unwrap_or("another operation");
                debug!(operation, in_flight, "Rejected concurrent mutation");
                return Err(GuardianError::ConcurrencyRejected {
                    operation,
                    in_flight,
                });
            }
        };

        // Dropped along with the single-flight guard if the caller gives up
        // while readers are still inside.
        let holder = HolderName::set(&self.holder, operation);

        let write = self.data.clone().write_owned().await;
        debug!(operation, "Acquired mutation permit");

        Ok(MutationPermit {
            _holder: holder,
            _write: write,
            _single_flight: single_flight,
            operation,
        })
    }

    /// Start a read-only operation, waiting out any mutation in progress.
    pub async fn begin_read(&self) -> RwLockReadGuard<'_, ()> {
        self.data.read().await
    }

    /// Name of the mutation in flight, if any.
    pub fn in_flight(&self) -> Option<&'static str> {
        self.holder.lock().ok().and_then(|h| *h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_second_mutation_is_rejected() {
        let gate = OperationGate::new();
        let permit = gate.begin_mutation("create_snapshot").await.unwrap();
        assert_eq!(gate.in_flight(), Some("create_snapshot"));

        let err = gate.begin_mutation("rollback").await.unwrap_err();
        match err {
            GuardianError::ConcurrencyRejected {
                operation,
                in_flight,
            } => {
                assert_eq!(operation, "rollback");
                assert_eq!(in_flight, "create_snapshot");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        drop(permit);
        assert_eq!(gate.in_flight(), None);
        gate.begin_mutation("rollback").await.unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_mutation_clears_in_flight() {
        let gate = OperationGate::new();
        let reader = gate.begin_read().await;

        let waiting =
            tokio::time::timeout(Duration::from_millis(20), gate.begin_mutation("rollback")).await;
        assert!(waiting.is_err());
        assert_eq!(gate.in_flight(), None);

        drop(reader);
        let _permit = gate.begin_mutation("create_backup").await.unwrap();
        assert_eq!(gate.in_flight(), Some("create_backup"));
    }

    #[tokio::test]
    async fn test_readers_share_access() {
        let gate = OperationGate::new();
        let _a = gate.begin_read().await;
        let _b = gate.begin_read().await;
    }

    #[tokio::test]
    async fn test_readers_wait_for_mutation() {
        let gate = Arc::new(OperationGate::new());
        let permit = gate.begin_mutation("restore_backup").await.unwrap();

        let reader = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _guard = gate.begin_read().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap();
    }
}
