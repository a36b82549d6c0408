use automation_core::{ExecutionRequest, StepOutcome};
use reqwest::Client;

use crate::error::{AgentError, Result};
use crate::types::{CreateSessionRequest, Session, StepRequest};

pub struct AgentClient {
    base_url: String,
    client: Client,
}

impl AgentClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_session(&self, request: &ExecutionRequest) -> Result<Session> {
        let body = CreateSessionRequest {
            task_id: request.task_id.clone(),
            description: request.description.clone(),
            config: request.config.clone(),
            schema: request.schema.clone(),
        };

        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .json(&body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn next_step(&self, session_id: &str, step_index: u32) -> Result<StepOutcome> {
        let response = self
            .client
            .post(format!("{}/sessions/{}/steps", self.base_url, session_id))
            .json(&StepRequest { step_index })
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn close_session(&self, session_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/sessions/{}", self.base_url, session_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status { status, body });
        }

        Ok(())
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AgentError::SessionNotFound(response.url().path().to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
