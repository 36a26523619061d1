//! Ordered test runs against a live control plane.
//!
//! A [`Job`] bootstraps a control plane (or attaches to one), installs
//! resource definitions, runs a reconciliation manager in the background
//! and then runs its [`TestUnit`]s one after another against a shared
//! client. Teardown always runs.
//!
//! ```no_run
//! use sortie_testing::{Job, JobConfig, TestUnit};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let units = vec![
//!     TestUnit::new("cluster-answers", |client| async move {
//!         client.health().await?;
//!         Ok(())
//!     }),
//! ];
//! let config = JobConfig::builder()
//!     .resource_definition_path("crds")
//!     .resync_interval("10s")
//!     .build();
//!
//! let report = Job::new("smoke", "basic checks", units, config)?.run().await?;
//! report.ensure_success()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Failure handling
//!
//! - A failing unit with `persist(false)` runs its janitor and stops the job;
//!   later units are skipped
//! - A failing unit with `persist(true)` is reported and the job moves on
//! - Any other failure is fatal and returned from [`Job::run`]

pub mod config;
pub mod duration;
pub mod environment;
pub mod error;
mod job;
pub mod report;
mod unit;
pub mod wait;

pub use config::{JobConfig, JobConfigBuilder, DEFAULT_RESYNC_INTERVAL};
pub use duration::{parse_duration, DurationError};
pub use environment::{EnvironmentError, TestEnvironment};
pub use error::{HarnessError, Stage};
pub use job::Job;
pub use report::{
    JanitorStatus, JobEvent, JobReport, RecordingReporter, Reporter, TracingReporter, UnitReport,
    UnitStatus, UnitsFailed,
};
pub use unit::{Step, TestUnit};
pub use wait::{poll_until, wait_for_deletion, wait_for_object, WaitError};
