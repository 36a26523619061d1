//! Client error types.

use thiserror::Error;

use crate::meta::StatusCause;

/// Errors returned by [`crate::Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection descriptor is unusable.
    #[error("invalid cluster configuration: {0}")]
    InvalidConfig(String),

    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The object or definition does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The object already exists or the write lost an optimistic-concurrency race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested event cursor is older than the retained change log.
    #[error("gone: {0}")]
    Gone(String),

    /// The control plane rejected the object.
    #[error("invalid: {message}")]
    Invalid {
        message: String,
        causes: Vec<StatusCause>,
    },

    /// Any other non-success response.
    #[error("API error ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// A body could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict(_))
    }

    pub fn is_gone(&self) -> bool {
        matches!(self, ClientError::Gone(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ClientError::Invalid { .. })
    }
}
