//! The job orchestrator.
//!
//! [`Job::run`] owns the whole lifecycle of one run:
//!
//! 1. Bootstrap the control plane and install resource definitions.
//! 2. Build the reconciliation manager and run the registration hooks.
//! 3. Start the manager in the background and wait until it is ready.
//! 4. Build the client and run the builder hook.
//! 5. Run the test units in order.
//! 6. Run the cleaner, stop the manager, stop the control plane.
//!
//! Step 6 runs for every resource acquired, whatever failed before it.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use sortie_client::{Client, ClusterConfig};
use sortie_reconcile::{Manager, ManagerHandle, ManagerOptions};
use tokio::time::Instant;
use tracing::{error, info, info_span, instrument, Instrument};

use crate::config::{ClientHook, ControllerHook, JobConfig, SchemaHook};
use crate::duration::parse_positive_duration;
use crate::environment::TestEnvironment;
use crate::error::HarnessError;
use crate::report::{
    JanitorStatus, JobEvent, JobReport, Reporter, TracingReporter, UnitReport, UnitStatus,
};
use crate::unit::TestUnit;

/// An ordered list of test units sharing one control plane.
pub struct Job {
    name: String,
    description: String,
    units: Vec<TestUnit>,
    config: JobConfig,
    resync_interval: Duration,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("units", &self.units)
            .field("config", &self.config)
            .field("resync_interval", &self.resync_interval)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Validate the configuration and build a job.
    ///
    /// Fails if the resync interval is not a positive duration or two units
    /// share a name. Nothing is started.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        units: Vec<TestUnit>,
        config: JobConfig,
    ) -> Result<Self, HarnessError> {
        let resync_interval = parse_positive_duration(&config.resync_interval).map_err(|source| {
            HarnessError::ResyncInterval {
                value: config.resync_interval.clone(),
                source,
            }
        })?;

        let mut seen = HashSet::new();
        for unit in &units {
            if !seen.insert(unit.name()) {
                return Err(HarnessError::DuplicateUnit(unit.name().to_string()));
            }
        }

        Ok(Self {
            name: name.into(),
            description: description.into(),
            units,
            config,
            resync_interval,
            reporter: Arc::new(TracingReporter),
        })
    }

    /// Replace the default [`TracingReporter`].
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn units(&self) -> &[TestUnit] {
        &self.units
    }

    pub fn resync_interval(&self) -> Duration {
        self.resync_interval
    }

    /// Run the job once.
    ///
    /// Returns an error if any step other than a test unit fails. When
    /// several steps fail, the first error is returned and the rest are
    /// logged. Unit failures are only reported.
    #[instrument(skip_all, fields(job = %self.name))]
    pub async fn run(self) -> Result<JobReport, HarnessError> {
        let Job {
            name,
            units,
            config,
            resync_interval,
            reporter,
            ..
        } = self;
        let JobConfig {
            resource_definition_paths,
            cluster,
            schema_registration,
            controller_registration,
            builder,
            cleaner,
            ..
        } = config;

        reporter.event(&JobEvent::JobStarted {
            job: name.clone(),
            units: units.len(),
        });

        let mut run = Run {
            reporter: reporter.as_ref(),
            units: &units,
            results: units
                .iter()
                .map(|unit| UnitReport {
                    name: unit.name().to_string(),
                    status: UnitStatus::Skipped,
                    janitor: JanitorStatus::NotRun,
                    elapsed: Duration::ZERO,
                })
                .collect(),
            ran: 0,
            fatal: None,
        };

        let mut environment = TestEnvironment::new(resource_definition_paths, cluster);
        let attached = environment.is_attached();
        match environment.start().await {
            Ok(cluster) => {
                run.reporter.event(&JobEvent::ControlPlaneStarted {
                    endpoint: cluster.endpoint.clone(),
                    attached,
                });
                let hooks = Hooks {
                    schema_registration,
                    controller_registration,
                    builder,
                    cleaner,
                };
                run.with_control_plane(&cluster, resync_interval, hooks)
                    .await;
            }
            Err(e) => run.fail(HarnessError::Bootstrap(e)),
        }

        // Also covers a server left running by a partial start.
        let stopped = environment.stop().await;
        run.reporter.event(&JobEvent::ControlPlaneStopped {
            error: stopped.as_ref().err().map(|e| e.to_string()),
        });
        if let Err(e) = stopped {
            run.fail(HarnessError::Teardown(e));
        }

        run.finish(name)
    }
}

struct Hooks {
    schema_registration: SchemaHook,
    controller_registration: ControllerHook,
    builder: ClientHook,
    cleaner: ClientHook,
}

/// State of one call to [`Job::run`].
struct Run<'a> {
    reporter: &'a dyn Reporter,
    units: &'a [TestUnit],
    results: Vec<UnitReport>,
    /// Units whose executor was started.
    ran: usize,
    fatal: Option<HarnessError>,
}

impl Run<'_> {
    /// Record a fatal error. The first one wins.
    fn fail(&mut self, err: HarnessError) {
        self.reporter.event(&JobEvent::Aborted {
            stage: err.stage(),
            error: err.to_string(),
        });
        if let Some(first) = &self.fatal {
            error!(
                stage = %err.stage(),
                error = %err,
                first_stage = %first.stage(),
                "Additional fatal error"
            );
            return;
        }
        self.fatal = Some(err);
    }

    async fn with_control_plane(
        &mut self,
        cluster: &ClusterConfig,
        resync_interval: Duration,
        hooks: Hooks,
    ) {
        let options = ManagerOptions::default().with_resync_interval(resync_interval);
        let mut manager = match Manager::new(cluster, options) {
            Ok(manager) => manager,
            Err(e) => return self.fail(HarnessError::Manager(e)),
        };

        let Hooks {
            schema_registration,
            controller_registration,
            builder,
            cleaner,
        } = hooks;

        if let Err(e) = call_hook(|| schema_registration(manager.scheme_mut())) {
            return self.fail(HarnessError::SchemaRegistration(e));
        }
        if let Err(e) = call_hook(|| controller_registration(&mut manager)) {
            return self.fail(HarnessError::ControllerRegistration(e));
        }

        let mut handle = manager.spawn();
        match self.connect(&mut handle, cluster).await {
            Ok(client) => self.with_client(client, builder, cleaner).await,
            Err(e) => self.fail(e),
        }

        let stopped = handle.stop().await;
        self.reporter.event(&JobEvent::ManagerStopped {
            error: stopped.as_ref().err().map(|e| e.to_string()),
        });
        if let Err(e) = stopped {
            self.fail(HarnessError::ManagerStop(e));
        }
    }

    /// Readiness checkpoint, then the client.
    async fn connect(
        &self,
        handle: &mut ManagerHandle,
        cluster: &ClusterConfig,
    ) -> Result<Client, HarnessError> {
        handle.wait_ready().await.map_err(HarnessError::ManagerStart)?;
        self.reporter.event(&JobEvent::ManagerStarted);

        let client = Client::new(cluster).map_err(HarnessError::Client)?;
        self.reporter.event(&JobEvent::ClientReady);
        Ok(client)
    }

    async fn with_client(&mut self, client: Client, builder: ClientHook, cleaner: ClientHook) {
        match run_step(builder(client.clone()).instrument(info_span!("builder"))).await {
            Ok(()) => {
                self.reporter.event(&JobEvent::BuilderRan);
                self.run_units(&client).await;
            }
            Err(e) => self.fail(HarnessError::Builder(e)),
        }

        for unit in &self.units[self.ran..] {
            self.reporter.event(&JobEvent::UnitSkipped {
                unit: unit.name().to_string(),
            });
        }

        let cleaned = run_step(cleaner(client).instrument(info_span!("cleaner"))).await;
        self.reporter.event(&JobEvent::CleanerRan {
            error: cleaned.as_ref().err().map(|e| format!("{e:#}")),
        });
        if let Err(e) = cleaned {
            self.fail(HarnessError::Cleaner(e));
        }
    }

    async fn run_units(&mut self, client: &Client) {
        let units = self.units;
        for (index, unit) in units.iter().enumerate() {
            self.ran = index + 1;
            let span = info_span!("unit", unit = %unit.name());
            self.reporter.event(&JobEvent::UnitStarted {
                unit: unit.name().to_string(),
            });

            let started = Instant::now();
            let result = run_step((unit.executor())(client.clone()).instrument(span.clone())).await;
            let elapsed = started.elapsed();
            let report = &mut self.results[index];
            report.elapsed = elapsed;

            let err = match result {
                Ok(()) => {
                    report.status = UnitStatus::Passed;
                    self.reporter.event(&JobEvent::UnitPassed {
                        unit: unit.name().to_string(),
                        elapsed,
                    });
                    continue;
                }
                Err(e) => format!("{e:#}"),
            };

            report.status = UnitStatus::Failed { error: err.clone() };
            self.reporter.event(&JobEvent::UnitFailed {
                unit: unit.name().to_string(),
                error: err,
                persist: unit.persists(),
            });
            if unit.persists() {
                continue;
            }

            let cleaned = run_step((unit.janitor_step())(client.clone()).instrument(span)).await;
            self.reporter.event(&JobEvent::JanitorRan {
                unit: unit.name().to_string(),
                error: cleaned.as_ref().err().map(|e| format!("{e:#}")),
            });
            match cleaned {
                Ok(()) => self.results[index].janitor = JanitorStatus::Succeeded,
                Err(source) => self.fail(HarnessError::Janitor {
                    unit: unit.name().to_string(),
                    source,
                }),
            }
            info!(unit = %unit.name(), "Stopping after failed test unit");
            break;
        }
    }

    fn finish(self, job: String) -> Result<JobReport, HarnessError> {
        let report = JobReport {
            job,
            units: self.results,
        };
        self.reporter.event(&JobEvent::JobFinished {
            passed: report.passed(),
            failed: report.failed(),
            skipped: report.skipped(),
        });
        match self.fatal {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}

/// Run a hook, turning a panic into an error.
fn call_hook<F>(hook: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    catch_unwind(AssertUnwindSafe(hook)).unwrap_or_else(|payload| {
        Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())))
    })
}

/// Run an async step on its own task, turning a panic into an error.
async fn run_step<F>(step: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    match tokio::spawn(step).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref())))
        }
        Err(e) => Err(anyhow::anyhow!("task failed: {e}")),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
