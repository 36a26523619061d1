//! Reconciliation errors.

use sortie_client::ClientError;
use thiserror::Error;

/// Errors raised by the [`crate::Manager`] itself.
///
/// Failures inside a reconciler are retried and logged, never returned here.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Manager options are unusable.
    #[error("invalid manager options: {0}")]
    InvalidOptions(String),

    /// Talking to the control plane failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Two registrations disagree about a group and kind.
    #[error("{group}/{kind} is already registered as {existing}")]
    SchemeConflict {
        group: String,
        kind: String,
        existing: String,
    },

    /// A controller was added for a kind missing from the scheme.
    #[error("kind {0} is not registered in the scheme")]
    NotRegistered(String),

    /// Controller names must be unique within a manager.
    #[error("a controller named {0:?} is already registered")]
    DuplicateController(String),

    /// The control plane does not serve a kind a controller watches.
    #[error("resource {0} is not served by the control plane")]
    NotServed(String),

    /// The manager task exited before reporting readiness.
    #[error("manager exited before it became ready")]
    ExitedBeforeReady,

    /// The manager task panicked.
    #[error("manager task panicked: {0}")]
    Panicked(String),
}
