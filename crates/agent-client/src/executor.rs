use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use automation_core::{EndReason, ExecutionRequest, ExecutorError, StepExecutor, StepOutcome};
use tracing::{debug, warn};

use crate::client::AgentClient;
use crate::error::AgentError;

/// Step executor backed by a remote browser agent. One agent session per task.
pub struct RemoteStepExecutor {
    client: AgentClient,
    sessions: Mutex<HashMap<String, String>>,
}

impl RemoteStepExecutor {
    pub fn new(client: AgentClient) -> Self {
        Self {
            client,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &AgentClient {
        &self.client
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn session_for(&self, task_id: &str) -> Option<String> {
        self.sessions().get(task_id).cloned()
    }

    async fn open_session(&self, request: &ExecutionRequest) -> Result<String, ExecutorError> {
        let session = self.client.create_session(request).await?;
        debug!(
            task_id = %request.task_id,
            session_id = %session.session_id,
            "Agent session opened"
        );
        self.sessions()
            .insert(request.task_id.clone(), session.session_id.clone());
        Ok(session.session_id)
    }
}

#[async_trait]
impl StepExecutor for RemoteStepExecutor {
    async fn begin(&self, request: &ExecutionRequest) -> Result<(), ExecutorError> {
        if self.session_for(&request.task_id).is_none() {
            self.open_session(request).await?;
        }
        Ok(())
    }

    async fn next_step(
        &self,
        request: &ExecutionRequest,
        step_index: u32,
    ) -> Result<StepOutcome, ExecutorError> {
        let session_id = match self.session_for(&request.task_id) {
            Some(id) => id,
            None => self.open_session(request).await?,
        };

        match self.client.next_step(&session_id, step_index).await {
            Ok(outcome) => Ok(outcome),
            Err(e @ AgentError::SessionNotFound(_)) => {
                // Forget the dead session so the next attempt opens a fresh one.
                self.sessions().remove(&request.task_id);
                warn!(
                    task_id = %request.task_id,
                    session_id = %session_id,
                    "Agent session expired"
                );
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn end(&self, task_id: &str, reason: EndReason) {
        let Some(session_id) = self.sessions().remove(task_id) else {
            return;
        };

        match self.client.close_session(&session_id).await {
            Ok(()) => debug!(task_id = %task_id, session_id = %session_id, ?reason, "Agent session closed"),
            Err(e) => warn!(
                task_id = %task_id,
                session_id = %session_id,
                error = %e,
                "Failed to close agent session"
            ),
        }
    }
}
