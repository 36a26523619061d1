//! sortie control plane.
//!
//! An in-memory API server for declarative resources: resource definitions
//! install new types, objects of those types are validated against their
//! schemas, and every change lands in an ordered event log that
//! reconciliation managers poll.
//!
//! The binary serves it on a fixed address; test harnesses embed it with
//! [`server::start`].

pub mod api;
pub mod config;
pub mod server;
pub mod state;
pub mod store;

pub use server::{start, ServerHandle};
pub use state::AppState;
pub use store::Store;
