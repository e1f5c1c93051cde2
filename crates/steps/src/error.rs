//! Step execution error types.

use thiserror::Error;

/// Errors that can occur while resolving or running a step.
#[derive(Debug, Error)]
pub enum StepError {
    /// Step not found in registry.
    #[error("Step not found: {0}")]
    NotFound(String),

    /// Step ran and reported failure.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Step exceeded its own timeout.
    #[error("Execution timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(String),

    /// Process spawn error.
    #[error("Process error: {0}")]
    Process(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl StepError {
    /// Failure reason as recorded on a step status.
    ///
    /// A step's own failure message is kept as-is; other errors keep their
    /// category prefix.
    pub fn reason(&self) -> String {
        match self {
            StepError::ExecutionFailed(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for StepError {
    fn from(e: std::io::Error) -> Self {
        StepError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StepError {
    fn from(e: serde_json::Error) -> Self {
        StepError::Json(e.to_string())
    }
}

impl From<minijinja::Error> for StepError {
    fn from(e: minijinja::Error) -> Self {
        StepError::Template(e.to_string())
    }
}
