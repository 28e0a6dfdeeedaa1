//! Hooks the host environment provides to the engine.

use crate::conflict::Conflict;

pub use vguard_snapshot::ProgressReporter;

/// How the host wants a conflict settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationChoice {
    /// Keep the current version's lines.
    KeepCurrent,
    /// Take the incoming version's lines.
    TakeIncoming,
    /// Use this text instead of either side.
    Custom(String),
    /// Leave the conflict unresolved.
    Skip,
}

/// Asked to settle conflicts whose automatic resolution is not confident
/// enough.
#[cfg_attr(test, mockall::automock)]
pub trait ConfirmationHandler: Send + Sync {
    fn confirm(&self, path: &str, conflict: &Conflict) -> ConfirmationChoice;
}
