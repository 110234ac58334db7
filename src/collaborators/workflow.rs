// ABOUTME: HTTP client for the workflow orchestration service
// ABOUTME: Reads the runtime state of a connection's sync workflow

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use uuid::Uuid;

use super::{LookupError, WorkflowState, WorkflowStateSource};

pub struct WorkflowClient {
    client: Client,
    api_base_url: String,
}

impl WorkflowClient {
    pub fn new(api_base_url: String, timeout: Duration) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn state_url(&self, connection_id: Uuid) -> String {
        format!("{}/workflows/{}/state", self.api_base_url, connection_id)
    }
}

#[async_trait]
impl WorkflowStateSource for WorkflowClient {
    async fn workflow_state(
        &self,
        connection_id: Uuid,
    ) -> Result<Option<WorkflowState>, LookupError> {
        let url = self.state_url(connection_id);

        let response = self.client.get(&url).send().await.map_err(|e| {
            LookupError::Unavailable(format!(
                "Failed to get workflow state from orchestration service: {}",
                e
            ))
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(%connection_id, "No workflow for connection");
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Unavailable(format!(
                "Workflow state request failed with status {}: {}",
                status, body
            )));
        }

        let state: WorkflowState = response.json().await?;
        Ok(Some(state))
    }
}
