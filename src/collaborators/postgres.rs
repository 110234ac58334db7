// ABOUTME: Connection, actor and connector definition lookups against the config database
// ABOUTME: Sources and destinations are validated against their definition's spec on read

use async_trait::async_trait;
use serde_json::Value;
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{
    validate_configuration, ActorRecord, ConfigLookup, ConnectionRecord, DefinitionRecord,
    LookupError,
};

const ACTOR_QUERY: &str = "SELECT actor.id, actor.name, actor.actor_definition_id, actor.workspace_id, \
     actor.configuration, actor_definition_version.spec \
     FROM actor \
     LEFT JOIN actor_definition ON actor_definition.id = actor.actor_definition_id \
     LEFT JOIN actor_definition_version ON actor_definition_version.id = actor_definition.default_version_id \
     WHERE actor.id = $1 AND CAST(actor.actor_type AS VARCHAR) = $2 AND actor.tombstone = FALSE";

const DEFINITION_QUERY: &str = "SELECT actor_definition.id, actor_definition.name, \
     actor_definition_version.docker_repository, actor_definition_version.docker_image_tag, \
     actor_definition_version.spec \
     FROM actor_definition \
     JOIN actor_definition_version ON actor_definition_version.id = actor_definition.default_version_id \
     WHERE actor_definition.id = $1 AND CAST(actor_definition.actor_type AS VARCHAR) = $2";

pub struct PgConfigLookup {
    client: Client,
}

impl PgConfigLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn actor(&self, id: Uuid, actor_type: &'static str) -> Result<ActorRecord, LookupError> {
        let row = self
            .client
            .query_opt(ACTOR_QUERY, &[&id, &actor_type])
            .await?
            .ok_or_else(|| LookupError::NotFound {
                entity_type: actor_type,
                id: id.to_string(),
            })?;

        let actor = ActorRecord {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            definition_id: row.try_get("actor_definition_id")?,
            workspace_id: row.try_get("workspace_id")?,
            configuration: row.try_get("configuration")?,
        };
        let spec: Option<Value> = row.try_get("spec")?;
        check_actor(&actor, spec.as_ref())?;
        Ok(actor)
    }

    async fn definition(
        &self,
        id: Uuid,
        actor_type: &'static str,
        entity_type: &'static str,
    ) -> Result<DefinitionRecord, LookupError> {
        let row = self
            .client
            .query_opt(DEFINITION_QUERY, &[&id, &actor_type])
            .await?
            .ok_or_else(|| LookupError::NotFound {
                entity_type,
                id: id.to_string(),
            })?;
        definition_from_row(&row)
    }
}

/// Validates an actor's configuration when its definition was found; a missing definition
/// is reported by the definition lookup instead.
fn check_actor(actor: &ActorRecord, spec: Option<&Value>) -> Result<(), LookupError> {
    match spec {
        Some(spec) => validate_configuration(actor.id, &actor.configuration, spec),
        None => Ok(()),
    }
}

fn definition_from_row(row: &Row) -> Result<DefinitionRecord, LookupError> {
    let spec: Option<Value> = row.try_get("spec")?;
    Ok(DefinitionRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        docker_repository: row.try_get("docker_repository")?,
        docker_image_tag: row.try_get("docker_image_tag")?,
        spec: spec.unwrap_or(Value::Null),
    })
}

#[async_trait]
impl ConfigLookup for PgConfigLookup {
    async fn connection(&self, connection_id: Uuid) -> Result<ConnectionRecord, LookupError> {
        let row = self
            .client
            .query_opt(
                "SELECT id, name, source_id, destination_id, CAST(status AS VARCHAR) AS status \
                 FROM connection WHERE id = $1",
                &[&connection_id],
            )
            .await?
            .ok_or_else(|| LookupError::NotFound {
                entity_type: "connection",
                id: connection_id.to_string(),
            })?;

        Ok(ConnectionRecord {
            connection_id: row.try_get("id")?,
            name: row.try_get("name")?,
            source_id: row.try_get("source_id")?,
            destination_id: row.try_get("destination_id")?,
            status: row.try_get("status")?,
        })
    }

    async fn source(&self, source_id: Uuid) -> Result<ActorRecord, LookupError> {
        self.actor(source_id, "source").await
    }

    async fn destination(&self, destination_id: Uuid) -> Result<ActorRecord, LookupError> {
        self.actor(destination_id, "destination").await
    }

    async fn source_definition(
        &self,
        definition_id: Uuid,
    ) -> Result<DefinitionRecord, LookupError> {
        self.definition(definition_id, "source", "source_definition").await
    }

    async fn destination_definition(
        &self,
        definition_id: Uuid,
    ) -> Result<DefinitionRecord, LookupError> {
        self.definition(definition_id, "destination", "destination_definition")
            .await
    }
}
