//! Harness errors.

use std::fmt;

use sortie_client::ClientError;
use sortie_reconcile::ReconcileError;
use thiserror::Error;

use crate::duration::DurationError;
use crate::environment::EnvironmentError;

/// Lifecycle step of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Config,
    Bootstrap,
    Manager,
    SchemaRegistration,
    ControllerRegistration,
    ManagerStart,
    Client,
    Builder,
    Janitor,
    Cleaner,
    ManagerStop,
    Teardown,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "config",
            Stage::Bootstrap => "bootstrap",
            Stage::Manager => "manager",
            Stage::SchemaRegistration => "schema_registration",
            Stage::ControllerRegistration => "controller_registration",
            Stage::ManagerStart => "manager_start",
            Stage::Client => "client",
            Stage::Builder => "builder",
            Stage::Janitor => "janitor",
            Stage::Cleaner => "cleaner",
            Stage::ManagerStop => "manager_stop",
            Stage::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job could not be built or its lifecycle failed.
///
/// Test unit failures are not errors; they are reported through the
/// reporter and the [`crate::JobReport`].
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid resync interval {value:?}: {source}")]
    ResyncInterval {
        value: String,
        #[source]
        source: DurationError,
    },

    #[error("test unit name {0:?} is used more than once")]
    DuplicateUnit(String),

    #[error("failed to bootstrap control plane: {0}")]
    Bootstrap(#[source] EnvironmentError),

    #[error("failed to create reconciliation manager: {0}")]
    Manager(#[source] ReconcileError),

    #[error("schema registration failed: {0:#}")]
    SchemaRegistration(#[source] anyhow::Error),

    #[error("controller registration failed: {0:#}")]
    ControllerRegistration(#[source] anyhow::Error),

    #[error("reconciliation manager failed to start: {0}")]
    ManagerStart(#[source] ReconcileError),

    #[error("failed to create client: {0}")]
    Client(#[source] ClientError),

    #[error("builder failed: {0:#}")]
    Builder(#[source] anyhow::Error),

    #[error("janitor of test unit {unit:?} failed: {source:#}")]
    Janitor {
        unit: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cleaner failed: {0:#}")]
    Cleaner(#[source] anyhow::Error),

    #[error("reconciliation manager exited with an error: {0}")]
    ManagerStop(#[source] ReconcileError),

    #[error("failed to stop control plane: {0}")]
    Teardown(#[source] EnvironmentError),
}

impl HarnessError {
    /// The lifecycle step that failed.
    pub fn stage(&self) -> Stage {
        match self {
            HarnessError::ResyncInterval { .. } | HarnessError::DuplicateUnit(_) => Stage::Config,
            HarnessError::Bootstrap(_) => Stage::Bootstrap,
            HarnessError::Manager(_) => Stage::Manager,
            HarnessError::SchemaRegistration(_) => Stage::SchemaRegistration,
            HarnessError::ControllerRegistration(_) => Stage::ControllerRegistration,
            HarnessError::ManagerStart(_) => Stage::ManagerStart,
            HarnessError::Client(_) => Stage::Client,
            HarnessError::Builder(_) => Stage::Builder,
            HarnessError::Janitor { .. } => Stage::Janitor,
            HarnessError::Cleaner(_) => Stage::Cleaner,
            HarnessError::ManagerStop(_) => Stage::ManagerStop,
            HarnessError::Teardown(_) => Stage::Teardown,
        }
    }
}
