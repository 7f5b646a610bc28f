// Domain Error Types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("Minimum period must be greater than zero")]
    ZeroPeriod,

    #[error("Minimum period {minimum:?} must be less than maximum period {maximum:?}")]
    InvalidPeriods { minimum: Duration, maximum: Duration },

    #[error("Invalid scale range {minimum}..={maximum} (minimum must be >= 1 and <= maximum)")]
    InvalidScale { minimum: usize, maximum: usize },

    #[error("Messages per scale unit must be greater than zero")]
    ZeroMessagesPerUnit,

    #[error("Check interval must be greater than zero")]
    ZeroCheckInterval,

    #[error("{0} must not be empty")]
    EmptyName(&'static str),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
