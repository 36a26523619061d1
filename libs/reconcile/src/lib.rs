//! Reconciliation manager for the sortie control plane.
//!
//! Controllers converge desired state to current state. Key concepts:
//!
//! - **Scheme**: the typed kinds a manager may watch ([`Scheme`]).
//! - **Reconciler**: user code that acts on one object ([`Reconciler`]).
//! - **Manager**: watches the control plane's change log and drives the
//!   reconcilers, with periodic resync and bounded retries ([`Manager`]).
//!
//! # Invariants
//!
//! - Reconcilers must be idempotent; they run on changes, resyncs and retries
//! - Objects whose spec and labels are unchanged are only revisited on resync
//! - A failing object is retried at most `max_retries` times per window

mod controller;
pub mod error;
pub mod hash;
mod manager;
pub mod retry;
pub mod scheme;

pub use controller::{Action, Context, ObjectKey, Reconciler};
pub use error::ReconcileError;
pub use hash::{Fingerprint, SpecHash};
pub use manager::{Manager, ManagerHandle, ManagerOptions};
pub use retry::RetryTracker;
pub use scheme::Scheme;

use std::time::Duration;

/// Default interval between full resyncs.
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Default change-log poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default retry limit per object.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default retry window.
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(10 * 60); // 10 minutes
