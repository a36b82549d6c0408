use automation_core::ExecutorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<AgentError> for ExecutorError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::Request(e) if e.is_timeout() => {
                ExecutorError::Unavailable(format!("request timed out: {e}"))
            }
            AgentError::Request(e) if e.is_connect() => {
                ExecutorError::Unavailable(format!("connection failed: {e}"))
            }
            AgentError::Request(e) => ExecutorError::Unavailable(e.to_string()),
            AgentError::Status { status, body } if status.is_server_error() => {
                ExecutorError::Unavailable(format!("Status {status}: {body}"))
            }
            other => ExecutorError::Protocol(other.to_string()),
        }
    }
}
