//! Typed client for the sortie control plane.
//!
//! A [`Client`] is built from a [`ClusterConfig`] and reads and writes
//! [`Resource`] types over the control plane's JSON API. The wire types in
//! [`meta`] are shared with the control plane itself.

mod client;
pub mod config;
pub mod error;
mod macros;
pub mod meta;
pub mod resource;

pub use client::Client;
pub use config::ClusterConfig;
pub use error::ClientError;
pub use meta::{EventList, EventType, ObjectList, ObjectMeta, StatusCause, WatchEvent};
pub use resource::{Namespace, Resource, ResourceType};
pub use sortie_crd::{CustomResourceDefinition, Scope};
