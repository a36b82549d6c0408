//! Contract between the orchestrator and the component that drives the browser.
//!
//! The orchestrator asks for one step at a time. Every call may fail; failures
//! are classified by their message and retried according to the task's policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::AutomationConfig;
use crate::domain::StepStatus;
use crate::schema::ResultSchema;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub task_id: String,
    pub description: String,
    pub config: AutomationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<ResultSchema>,
}

/// Progress reported for a new step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepReport {
    pub action: String,
    #[serde(default = "default_report_status")]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

fn default_report_status() -> StepStatus {
    StepStatus::Completed
}

impl StepReport {
    pub fn completed(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: StepStatus::Completed,
            detail: None,
        }
    }

    pub fn running(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: StepStatus::Running,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutcome {
    /// A new step was performed (or started, when its status is `Running`).
    Step(StepReport),
    /// The most recent `Running` step finished.
    StepResolved {
        status: StepStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<Value>,
    },
    /// The task is done and produced a result.
    Finished { result: Value },
    /// The executor gave up; no retry will help.
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("{0}")]
    Step(String),

    #[error("Executor unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected executor response: {0}")]
    Protocol(String),
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Prepare whatever session state the task needs.
    async fn begin(&self, _request: &ExecutionRequest) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn next_step(
        &self,
        request: &ExecutionRequest,
        step_index: u32,
    ) -> Result<StepOutcome, ExecutorError>;

    /// Release session resources. Called once per executed task.
    async fn end(&self, _task_id: &str, _reason: EndReason) {}
}
