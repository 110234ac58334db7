// ABOUTME: In-process connection/source/destination lookup
// ABOUTME: Applies the same configuration validation as the database-backed lookup

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    validate_configuration, ActorRecord, ConfigLookup, ConnectionRecord, DefinitionRecord,
    LookupError,
};

#[derive(Default)]
struct Records {
    connections: HashMap<Uuid, ConnectionRecord>,
    sources: HashMap<Uuid, ActorRecord>,
    destinations: HashMap<Uuid, ActorRecord>,
    source_definitions: HashMap<Uuid, DefinitionRecord>,
    destination_definitions: HashMap<Uuid, DefinitionRecord>,
}

#[derive(Default)]
pub struct InMemoryConfigLookup {
    records: Mutex<Records>,
}

impl InMemoryConfigLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_connection(&self, connection: ConnectionRecord) {
        self.records()
            .connections
            .insert(connection.connection_id, connection);
    }

    pub fn remove_connection(&self, connection_id: Uuid) {
        self.records().connections.remove(&connection_id);
    }

    pub fn insert_source(&self, source: ActorRecord) {
        self.records().sources.insert(source.id, source);
    }

    pub fn insert_destination(&self, destination: ActorRecord) {
        self.records().destinations.insert(destination.id, destination);
    }

    pub fn insert_source_definition(&self, definition: DefinitionRecord) {
        self.records()
            .source_definitions
            .insert(definition.id, definition);
    }

    pub fn insert_destination_definition(&self, definition: DefinitionRecord) {
        self.records()
            .destination_definitions
            .insert(definition.id, definition);
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn find_actor(
    actors: &HashMap<Uuid, ActorRecord>,
    definitions: &HashMap<Uuid, DefinitionRecord>,
    entity_type: &'static str,
    id: Uuid,
) -> Result<ActorRecord, LookupError> {
    let actor = actors.get(&id).ok_or_else(|| LookupError::NotFound {
        entity_type,
        id: id.to_string(),
    })?;
    if let Some(definition) = definitions.get(&actor.definition_id) {
        validate_configuration(actor.id, &actor.configuration, &definition.spec)?;
    }
    Ok(actor.clone())
}

fn find_definition(
    definitions: &HashMap<Uuid, DefinitionRecord>,
    entity_type: &'static str,
    id: Uuid,
) -> Result<DefinitionRecord, LookupError> {
    definitions.get(&id).cloned().ok_or_else(|| LookupError::NotFound {
        entity_type,
        id: id.to_string(),
    })
}

#[async_trait]
impl ConfigLookup for InMemoryConfigLookup {
    async fn connection(&self, connection_id: Uuid) -> Result<ConnectionRecord, LookupError> {
        self.records()
            .connections
            .get(&connection_id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                entity_type: "connection",
                id: connection_id.to_string(),
            })
    }

    async fn source(&self, source_id: Uuid) -> Result<ActorRecord, LookupError> {
        let records = self.records();
        find_actor(&records.sources, &records.source_definitions, "source", source_id)
    }

    async fn destination(&self, destination_id: Uuid) -> Result<ActorRecord, LookupError> {
        let records = self.records();
        find_actor(
            &records.destinations,
            &records.destination_definitions,
            "destination",
            destination_id,
        )
    }

    async fn source_definition(
        &self,
        definition_id: Uuid,
    ) -> Result<DefinitionRecord, LookupError> {
        find_definition(&self.records().source_definitions, "source_definition", definition_id)
    }

    async fn destination_definition(
        &self,
        definition_id: Uuid,
    ) -> Result<DefinitionRecord, LookupError> {
        find_definition(
            &self.records().destination_definitions,
            "destination_definition",
            definition_id,
        )
    }
}
