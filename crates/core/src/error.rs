// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Three families matter to callers:
/// - configuration (`Config`, `Domain`): fatal at construction, never corrected
/// - transient I/O (`Transport`, `Processing`, `Serialization`, `Io`): raised
///   inside a consume cycle; the backoff driver logs them and keeps running
/// - lifecycle (`Lifecycle`): a task failed to start/stop/dispose; isolated per task
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lifecycle error in {task}: {reason}")]
    Lifecycle { task: String, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short stable label (snake_case) for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            AppError::Domain(_) | AppError::Config(_) => "configuration",
            AppError::Transport(_) => "transport",
            AppError::Processing(_) => "processing",
            AppError::Io(_) => "io",
            AppError::Serialization(_) => "serialization",
            AppError::Lifecycle { .. } => "lifecycle",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Internal(_) => "internal",
        }
    }

    /// True for errors raised while validating constructor arguments
    pub fn is_configuration(&self) -> bool {
        matches!(self, AppError::Domain(_) | AppError::Config(_))
    }

    pub(crate) fn lifecycle(task: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Lifecycle {
            task: task.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::Transport(String)
