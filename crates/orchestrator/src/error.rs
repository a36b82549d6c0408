use automation_core::{CoreError, ErrorCategory, TaskError};
use thiserror::Error;

/// A classified failure of a call made on behalf of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    pub category: ErrorCategory,
    pub message: String,
    pub suggestion: String,
    pub attempts: u32,
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} after {} attempt(s))",
            self.message, self.category, self.attempts
        )
    }
}

impl From<ExecutionFailure> for TaskError {
    fn from(failure: ExecutionFailure) -> Self {
        TaskError {
            category: failure.category,
            message: failure.message,
            suggestion: failure.suggestion,
            attempts: failure.attempts,
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task already exists: {0}")]
    DuplicateTask(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Task registry is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
