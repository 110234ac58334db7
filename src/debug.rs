// ABOUTME: Assembles the debug record of a job from the job store and config lookups
// ABOUTME: Lookup failures are translated into history errors naming the missing entity

use serde::Serialize;
use uuid::Uuid;

use crate::collaborators::{
    ActorRecord, ConfigLookup, ConnectionRecord, DefinitionRecord, LookupError, WorkflowState,
    WorkflowStateSource,
};
use crate::error::{EntityKind, HistoryError, HistoryResult};
use crate::hydrate::hydrate_attempt;
use crate::logs::LogReader;
use crate::models::{ConfigType, Job, JobId};
use crate::query::QueryPlanner;
use crate::status::JobStatus;
use crate::store::JobStore;
use crate::views::{attempt_info_read, job_read, AttemptInfoRead, JobInfoRead};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDebugRead {
    pub id: JobId,
    pub config_type: ConfigType,
    pub config_id: String,
    pub status: JobStatus,
    pub platform_version: String,
    pub source_definition: DefinitionRecord,
    pub destination_definition: DefinitionRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDebugInfoRead {
    pub job: JobDebugRead,
    pub attempts: Vec<AttemptInfoRead>,
    pub connection: ConnectionRecord,
    pub source: ActorRecord,
    pub destination: ActorRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_state: Option<WorkflowState>,
}

/// Maps a lookup failure for `entity` onto the history error kinds.
fn translate(entity: EntityKind, id: Uuid) -> impl FnOnce(LookupError) -> HistoryError {
    move |err| match err {
        LookupError::NotFound { .. } => HistoryError::not_found(entity, id),
        LookupError::InvalidConfiguration { message, .. } => {
            HistoryError::validation(entity, id, message)
        }
        LookupError::Unavailable(message) => {
            HistoryError::transient(format!("{} lookup failed: {}", entity, message))
        }
    }
}

/// Job info with each attempt's logs and its own stored statistics.
pub async fn job_info_with_attempt_stats(
    store: &dyn JobStore,
    logs: LogReader,
    job: &Job,
) -> HistoryResult<JobInfoRead> {
    let mut attempts = Vec::with_capacity(job.attempts.len());
    for attempt in &job.attempts {
        let log = logs.read(attempt.log_path.as_deref()).await?;
        let mut info = attempt_info_read(attempt, Some(log));
        let stats = store.attempt_stats(job.id, attempt.attempt_number).await?;
        hydrate_attempt(&mut info.attempt, &stats);
        attempts.push(info);
    }
    Ok(JobInfoRead {
        job: job_read(job),
        attempts,
    })
}

/// Everything needed to build a job's debug record.
pub struct DebugInfoAssembler<'a> {
    pub store: &'a dyn JobStore,
    pub configs: &'a dyn ConfigLookup,
    pub workflows: Option<&'a dyn WorkflowStateSource>,
    pub logs: LogReader,
    pub platform_version: &'a str,
}

impl DebugInfoAssembler<'_> {
    pub async fn debug_info(&self, job_id: JobId) -> HistoryResult<JobDebugInfoRead> {
        let job = QueryPlanner::new(self.store).get_job(job_id).await?;
        let info = job_info_with_attempt_stats(self.store, self.logs, &job).await?;

        let connection_id = job
            .connection_id()
            .ok_or_else(|| HistoryError::not_found(EntityKind::Connection, &job.scope))?;
        let connection = self
            .configs
            .connection(connection_id)
            .await
            .map_err(translate(EntityKind::Connection, connection_id))?;

        let source = self
            .configs
            .source(connection.source_id)
            .await
            .map_err(translate(EntityKind::Source, connection.source_id))?;
        let destination = self
            .configs
            .destination(connection.destination_id)
            .await
            .map_err(translate(EntityKind::Destination, connection.destination_id))?;
        let source_definition = self
            .configs
            .source_definition(source.definition_id)
            .await
            .map_err(translate(EntityKind::SourceDefinition, source.definition_id))?;
        let destination_definition = self
            .configs
            .destination_definition(destination.definition_id)
            .await
            .map_err(translate(
                EntityKind::DestinationDefinition,
                destination.definition_id,
            ))?;

        let workflow_state = match self.workflows {
            Some(workflows) => workflows
                .workflow_state(connection_id)
                .await
                .map_err(|e| HistoryError::transient(format!("workflow state lookup failed: {}", e)))?,
            None => None,
        };

        tracing::debug!(job_id, %connection_id, "Assembled job debug info");
        Ok(JobDebugInfoRead {
            job: JobDebugRead {
                id: job.id,
                config_type: job.config_type,
                config_id: job.scope.clone(),
                status: job.status,
                platform_version: self.platform_version.to_string(),
                source_definition,
                destination_definition,
            },
            attempts: info.attempts,
            connection,
            source,
            destination,
            workflow_state,
        })
    }
}
