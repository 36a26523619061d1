//! Reporting context and job results.
//!
//! A [`Reporter`] receives one [`JobEvent`] per lifecycle step while a job
//! runs. [`TracingReporter`] logs them; [`RecordingReporter`] keeps them for
//! assertions. The [`JobReport`] returned by a successful run summarises the
//! units.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::Stage;

/// Something that happened while a job ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    JobStarted {
        job: String,
        units: usize,
    },
    ControlPlaneStarted {
        endpoint: String,
        attached: bool,
    },
    ManagerStarted,
    ClientReady,
    BuilderRan,
    UnitStarted {
        unit: String,
    },
    UnitPassed {
        unit: String,
        elapsed: Duration,
    },
    UnitFailed {
        unit: String,
        error: String,
        persist: bool,
    },
    UnitSkipped {
        unit: String,
    },
    JanitorRan {
        unit: String,
        error: Option<String>,
    },
    CleanerRan {
        error: Option<String>,
    },
    ManagerStopped {
        error: Option<String>,
    },
    ControlPlaneStopped {
        error: Option<String>,
    },
    /// A fatal error. Teardown still runs after it.
    Aborted {
        stage: Stage,
        error: String,
    },
    JobFinished {
        passed: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Receives job events. Shared across the whole run.
pub trait Reporter: Send + Sync {
    fn event(&self, event: &JobEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn event(&self, event: &JobEvent) {
        match event {
            JobEvent::JobStarted { job, units } => info!(job = %job, units, "Job started"),
            JobEvent::ControlPlaneStarted { endpoint, attached } => {
                info!(endpoint = %endpoint, attached, "Control plane ready")
            }
            JobEvent::ManagerStarted => info!("Reconciliation manager started"),
            JobEvent::ClientReady => info!("Client ready"),
            JobEvent::BuilderRan => info!("Builder ran"),
            JobEvent::UnitStarted { unit } => info!(unit = %unit, "Running test unit"),
            JobEvent::UnitPassed { unit, elapsed } => {
                info!(unit = %unit, elapsed_ms = elapsed.as_millis() as u64, "Test unit passed")
            }
            JobEvent::UnitFailed {
                unit,
                error,
                persist: true,
            } => warn!(
                unit = %unit,
                error = %error,
                "Test unit failed, continuing with the next unit"
            ),
            JobEvent::UnitFailed { unit, error, .. } => {
                error!(unit = %unit, error = %error, "Test unit failed, stopping")
            }
            JobEvent::UnitSkipped { unit } => info!(unit = %unit, "Test unit skipped"),
            JobEvent::JanitorRan { unit, error: None } => info!(unit = %unit, "Janitor ran"),
            JobEvent::JanitorRan {
                unit,
                error: Some(error),
            } => error!(unit = %unit, error = %error, "Janitor failed"),
            JobEvent::CleanerRan { error: None } => info!("Cleaner ran"),
            JobEvent::CleanerRan { error: Some(error) } => error!(error = %error, "Cleaner failed"),
            JobEvent::ManagerStopped { error: None } => info!("Reconciliation manager stopped"),
            JobEvent::ManagerStopped { error: Some(error) } => {
                error!(error = %error, "Reconciliation manager exited with an error")
            }
            JobEvent::ControlPlaneStopped { error: None } => info!("Control plane stopped"),
            JobEvent::ControlPlaneStopped { error: Some(error) } => {
                error!(error = %error, "Control plane failed to stop")
            }
            JobEvent::Aborted { stage, error } => {
                error!(stage = %stage, error = %error, "Job aborted")
            }
            JobEvent::JobFinished {
                passed,
                failed,
                skipped,
            } => info!(passed, failed, skipped, "Job finished"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen so far, in order.
    pub fn events(&self) -> Vec<JobEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl Reporter for RecordingReporter {
    fn event(&self, event: &JobEvent) {
        TracingReporter.event(event);
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Passed,
    Failed { error: String },
    /// Not run because an earlier unit failed without `persist`.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JanitorStatus {
    NotRun,
    Succeeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub name: String,
    pub status: UnitStatus,
    pub janitor: JanitorStatus,
    pub elapsed: Duration,
}

/// Outcome of a job whose lifecycle completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job: String,
    pub units: Vec<UnitReport>,
}

impl JobReport {
    pub fn passed(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Skipped))
    }

    fn count(&self, f: impl Fn(&UnitStatus) -> bool) -> usize {
        self.units.iter().filter(|u| f(&u.status)).count()
    }

    pub fn unit(&self, name: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.name == name)
    }

    /// True when no unit failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Turn failed units into an error.
    pub fn ensure_success(&self) -> Result<(), UnitsFailed> {
        let failed: Vec<String> = self
            .units
            .iter()
            .filter(|u| matches!(u.status, UnitStatus::Failed { .. }))
            .map(|u| u.name.clone())
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(UnitsFailed {
                job: self.job.clone(),
                failed,
            })
        }
    }
}

/// Returned by [`JobReport::ensure_success`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job {job:?}: {} test unit(s) failed: {}", .failed.len(), .failed.join(", "))]
pub struct UnitsFailed {
    pub job: String,
    pub failed: Vec<String>,
}
