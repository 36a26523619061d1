//! Error types for resource-definition loading.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading a resource definition.
#[derive(Debug, Error)]
pub enum CrdError {
    /// The document is not valid YAML/JSON or does not match the versioned shape.
    #[error("failed to decode resource definition: {0}")]
    Decode(#[from] serde_yaml::Error),

    /// The document declares an apiVersion this loader does not understand.
    #[error("unsupported apiVersion {0:?}")]
    UnsupportedVersion(String),

    /// The document is not a resource definition at all.
    #[error("unsupported kind {0:?}: expected CustomResourceDefinition")]
    UnsupportedKind(String),

    /// Semantic validation failed. Every problem found is reported.
    #[error("resource definition {name:?} is invalid: {errors}")]
    Invalid { name: String, errors: FieldErrors },

    /// Two documents define the same resource definition name.
    #[error("resource definition {0:?} is defined more than once")]
    Duplicate(String),

    /// A definition file or directory could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed.
    #[error("failed to walk definition directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// A file failed to load; wraps the underlying error with its path.
    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: Box<CrdError>,
    },
}

impl CrdError {
    /// Returns the field errors if this is a validation failure.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            CrdError::Invalid { errors, .. } => Some(errors),
            CrdError::File { source, .. } => source.field_errors(),
            _ => None,
        }
    }
}

/// The category of a field validation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    Required,
    Invalid,
    Duplicate,
}

/// A single validation problem, addressed by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
    pub message: String,
}

impl FieldError {
    pub fn required(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: FieldErrorKind::Required,
            message: "Required value".to_string(),
        }
    }

    pub fn invalid(field: impl Into<String>, value: &str, detail: impl fmt::Display) -> Self {
        Self {
            field: field.into(),
            kind: FieldErrorKind::Invalid,
            message: format!("Invalid value: {value:?}: {detail}"),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: &str) -> Self {
        Self {
            field: field.into(),
            kind: FieldErrorKind::Duplicate,
            message: format!("Duplicate value: {value:?}"),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// An aggregate of validation problems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(pub Vec<FieldError>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// Returns true if any error is reported against `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "[]"),
            [only] => write!(f, "{only}"),
            many => {
                write!(f, "[")?;
                for (i, e) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<Vec<FieldError>> for FieldErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}
