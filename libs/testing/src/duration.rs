//! Duration strings such as `"30s"`, `"1m30s"` or `"2h 15m"`.
//!
//! Parsing is delegated to `humantime`. On top of it a bare `"0"` is
//! accepted, the micro sign spelling `µs` is treated as `us`, and negative
//! durations are rejected with their own error.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("negative duration {0:?}")]
    Negative(String),

    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("duration {0:?} is out of range")]
    Overflow(String),

    #[error("duration {0:?} must be positive")]
    NotPositive(String),
}

impl DurationError {
    fn from_humantime(err: humantime::DurationError, input: &str) -> Self {
        use humantime::DurationError as H;

        match err {
            H::Empty => Self::Empty,
            H::NumberOverflow => Self::Overflow(input.to_string()),
            H::UnknownUnit { unit, .. } if unit.is_empty() => {
                Self::MissingUnit(input.to_string())
            }
            H::UnknownUnit { unit, .. } => Self::UnknownUnit {
                unit,
                input: input.to_string(),
            },
            H::InvalidCharacter(_) | H::NumberExpected(_) => Self::Invalid(input.to_string()),
        }
    }
}

/// Parse a duration string.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DurationError::Empty);
    }
    if let Some(magnitude) = trimmed.strip_prefix('-') {
        return Err(match parse_duration(magnitude) {
            Ok(_) => DurationError::Negative(input.to_string()),
            Err(_) => DurationError::Invalid(input.to_string()),
        });
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let normalized = trimmed.replace(['µ', 'μ'], "u");
    humantime::parse_duration(&normalized)
        .map_err(|err| DurationError::from_humantime(err, input))
}

/// Parse a duration that must be greater than zero.
pub fn parse_positive_duration(input: &str) -> Result<Duration, DurationError> {
    let duration = parse_duration(input)?;
    if duration.is_zero() {
        return Err(DurationError::NotPositive(input.to_string()));
    }
    Ok(duration)
}
