//! Store error types.

use sortie_client::StatusCause;
use thiserror::Error;

/// Errors returned by [`super::Store`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource type, object or definition does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// An object or definition with the same key already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Optimistic concurrency check failed.
    #[error("{0}")]
    Conflict(String),

    /// The request is malformed (names, namespaces, type meta).
    #[error("{0}")]
    BadRequest(String),

    /// The object or definition failed validation.
    #[error("{message}")]
    Invalid {
        message: String,
        causes: Vec<StatusCause>,
    },

    /// The event cursor points before the retained part of the log.
    #[error("events after {requested} are no longer retained (oldest is {oldest})")]
    Expired { requested: u64, oldest: u64 },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
