use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One reported unit of progress within a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Step {
    pub index: u32,
    pub action: String,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub detail: Option<Value>,
}

impl Step {
    pub fn new(index: u32, action: impl Into<String>, status: StepStatus) -> Self {
        Self {
            index,
            action: action.into(),
            status,
            timestamp: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Option<Value>) -> Self {
        self.detail = detail;
        self
    }

    /// Move a `Running` step to its final status. Any other transition is rejected.
    pub fn resolve(&mut self, status: StepStatus) -> Result<(), CoreError> {
        if self.status != StepStatus::Running || status == StepStatus::Running {
            return Err(CoreError::InvalidStepTransition {
                index: self.index,
                from: self.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }
        self.status = status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_running_step() {
        let mut step = Step::new(0, "click", StepStatus::Running);
        step.resolve(StepStatus::Completed).unwrap();
        assert_eq!(step.status, StepStatus::Completed);
    }

    #[test]
    fn test_resolve_rejects_finished_step() {
        let mut step = Step::new(3, "click", StepStatus::Failed);
        let err = step.resolve(StepStatus::Completed).unwrap_err();
        assert!(err.to_string().contains("step 3"));
        assert_eq!(step.status, StepStatus::Failed);
    }

    #[test]
    fn test_resolve_rejects_running_target() {
        let mut step = Step::new(0, "click", StepStatus::Running);
        assert!(step.resolve(StepStatus::Running).is_err());
    }

    #[test]
    fn test_step_serialization_omits_empty_detail() {
        let step = Step::new(1, "search", StepStatus::Completed);
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["action"], "search");
        assert_eq!(json["status"], "completed");
        assert!(json.get("detail").is_none());
    }
}
