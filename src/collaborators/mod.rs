// ABOUTME: Lookups the debug-info path needs from outside the job store
// ABOUTME: Connections, sources, destinations, definitions and workflow runtime state

pub mod memory;
pub mod postgres;
pub mod workflow;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryConfigLookup;
pub use postgres::PgConfigLookup;
pub use workflow::WorkflowClient;

/// Failure vocabulary of the lookup collaborators.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{entity_type} {id} does not exist")]
    NotFound { entity_type: &'static str, id: String },
    #[error("configuration of {id} is invalid: {message}")]
    InvalidConfiguration { id: String, message: String },
    #[error("lookup unavailable: {0}")]
    Unavailable(String),
}

impl From<tokio_postgres::Error> for LookupError {
    fn from(err: tokio_postgres::Error) -> Self {
        LookupError::Unavailable(err.to_string())
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        LookupError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub connection_id: Uuid,
    pub name: String,
    pub source_id: Uuid,
    pub destination_id: Uuid,
    pub status: String,
}

/// A configured source or destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRecord {
    pub id: Uuid,
    pub name: String,
    pub definition_id: Uuid,
    pub workspace_id: Uuid,
    #[serde(default, skip_serializing)]
    pub configuration: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionRecord {
    pub id: Uuid,
    pub name: String,
    pub docker_repository: String,
    pub docker_image_tag: String,
    #[serde(default, skip_serializing)]
    pub spec: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub running: bool,
    #[serde(default)]
    pub paused: bool,
}

#[async_trait]
pub trait ConfigLookup: Send + Sync {
    async fn connection(&self, connection_id: Uuid) -> Result<ConnectionRecord, LookupError>;
    async fn source(&self, source_id: Uuid) -> Result<ActorRecord, LookupError>;
    async fn destination(&self, destination_id: Uuid) -> Result<ActorRecord, LookupError>;
    async fn source_definition(&self, definition_id: Uuid)
        -> Result<DefinitionRecord, LookupError>;
    async fn destination_definition(
        &self,
        definition_id: Uuid,
    ) -> Result<DefinitionRecord, LookupError>;
}

#[async_trait]
pub trait WorkflowStateSource: Send + Sync {
    /// `Ok(None)` when no workflow exists for the connection.
    async fn workflow_state(&self, connection_id: Uuid)
        -> Result<Option<WorkflowState>, LookupError>;
}

/// Validates a persisted configuration against the `connectionSpecification` JSON schema of
/// its connector spec. A spec without a connection specification accepts any object.
pub fn validate_configuration(actor_id: Uuid, configuration: &Value, spec: &Value) -> Result<(), LookupError> {
    let invalid = |message: String| LookupError::InvalidConfiguration {
        id: actor_id.to_string(),
        message,
    };

    if !configuration.is_object() {
        return Err(invalid("configuration is not a JSON object".to_string()));
    }
    let Some(schema) = spec.get("connectionSpecification") else {
        return Ok(());
    };

    let validator = jsonschema::validator_for(schema)
        .map_err(|e| invalid(format!("connector spec is not a valid JSON schema: {}", e)))?;
    let errors: Vec<String> = validator
        .iter_errors(configuration)
        .map(|error| {
            let path = error.instance_path.to_string();
            if path.is_empty() {
                error.to_string()
            } else {
                format!("{}: {}", path, error)
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(invalid(errors.join("; ")))
    }
}
