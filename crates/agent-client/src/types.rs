use automation_core::{AutomationConfig, ResultSchema};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub task_id: String,
    pub description: String,
    pub config: AutomationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<ResultSchema>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepRequest {
    pub step_index: u32,
}
