// ABOUTME: Public job history operations exposed to API callers and the CLI
// ABOUTME: Wires the query planner, stats hydration, progress and debug assembly to the collaborators

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::collaborators::{ConfigLookup, WorkflowStateSource};
use crate::debug::{job_info_with_attempt_stats, DebugInfoAssembler, JobDebugInfoRead};
use crate::error::HistoryResult;
use crate::hydrate::hydrate_with_stats;
use crate::logs::LogReader;
use crate::models::{AttemptNormalizationStatus, Job, JobId, JobStatusSummary, StreamKey, SyncMode};
use crate::progress::{sync_progress, SyncProgressItem};
use crate::query::{
    plan_job_list, plan_workspace_job_list, JobListForWorkspacesRequest, JobListRequest,
    QueryPlanner, DEFAULT_PAGE_SIZE,
};
use crate::store::JobStore;
use crate::views::{
    job_info_light_read, job_optional_read, job_read, job_with_attempts_read, AttemptInfoRead,
    JobInfoLightRead, JobInfoRead, JobOptionalRead, JobRead, JobReadList, JobWithAttemptsRead,
};

/// Per-deployment knobs of the handler.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub default_page_size: u32,
    /// Whether listings carry aggregated attempt statistics.
    pub hydrate_aggregated_stats: bool,
    pub log_tail_lines: usize,
    pub platform_version: String,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            hydrate_aggregated_stats: false,
            log_tail_lines: 1000,
            platform_version: "dev".to_string(),
        }
    }
}

/// One entry of a job's stream → sync mode mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSyncMode {
    pub stream_name: String,
    pub stream_namespace: Option<String>,
    pub sync_mode: SyncMode,
}

pub struct JobHistoryHandler {
    store: Arc<dyn JobStore>,
    configs: Arc<dyn ConfigLookup>,
    workflows: Option<Arc<dyn WorkflowStateSource>>,
    settings: HandlerSettings,
}

impl JobHistoryHandler {
    pub fn new(
        store: Arc<dyn JobStore>,
        configs: Arc<dyn ConfigLookup>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            store,
            configs,
            workflows: None,
            settings,
        }
    }

    pub fn with_workflows(mut self, workflows: Arc<dyn WorkflowStateSource>) -> Self {
        self.workflows = Some(workflows);
        self
    }

    fn planner(&self) -> QueryPlanner<'_> {
        QueryPlanner::new(self.store.as_ref())
    }

    fn logs(&self) -> LogReader {
        LogReader::new(self.settings.log_tail_lines)
    }

    async fn hydrated(&self, jobs: &[Job], enabled: bool) -> HistoryResult<Vec<JobWithAttemptsRead>> {
        let mut views: Vec<JobWithAttemptsRead> = jobs.iter().map(job_with_attempts_read).collect();
        hydrate_with_stats(self.store.as_ref(), &mut views, jobs, enabled).await?;
        Ok(views)
    }

    pub async fn list_jobs_for(&self, request: &JobListRequest) -> HistoryResult<JobReadList> {
        let query = plan_job_list(request, self.settings.default_page_size)?;
        let page = self.planner().list_jobs_with_count(&query).await?;
        let jobs = self
            .hydrated(&page.jobs, self.settings.hydrate_aggregated_stats)
            .await?;
        Ok(JobReadList {
            jobs,
            total_job_count: page.total_count,
        })
    }

    pub async fn list_jobs_for_workspaces(
        &self,
        request: &JobListForWorkspacesRequest,
    ) -> HistoryResult<JobReadList> {
        let query = plan_workspace_job_list(request, self.settings.default_page_size)?;
        let jobs = self.planner().list_jobs(&query).await?;
        let jobs = self
            .hydrated(&jobs, self.settings.hydrate_aggregated_stats)
            .await?;
        Ok(JobReadList {
            total_job_count: jobs.len() as u64,
            jobs,
        })
    }

    /// Job with every attempt's stored statistics and log tail.
    pub async fn get_job_info(&self, job_id: JobId) -> HistoryResult<JobInfoRead> {
        let job = self.planner().get_job(job_id).await?;
        job_info_with_attempt_stats(self.store.as_ref(), self.logs(), &job).await
    }

    /// Job with aggregated statistics and no logs.
    pub async fn get_job_info_without_logs(&self, job_id: JobId) -> HistoryResult<JobInfoRead> {
        let job = self.planner().get_job(job_id).await?;
        let mut view = job_with_attempts_read(&job);
        hydrate_with_stats(
            self.store.as_ref(),
            std::slice::from_mut(&mut view),
            std::slice::from_ref(&job),
            true,
        )
        .await?;

        Ok(JobInfoRead {
            job: view.job,
            attempts: view
                .attempts
                .into_iter()
                .map(|attempt| AttemptInfoRead { attempt, logs: None })
                .collect(),
        })
    }

    pub async fn get_job_info_light(&self, job_id: JobId) -> HistoryResult<JobInfoLightRead> {
        let job = self.planner().get_job(job_id).await?;
        Ok(job_info_light_read(&job))
    }

    pub async fn get_last_replication_job(&self, connection_id: Uuid) -> HistoryResult<JobOptionalRead> {
        let job = self.planner().last_replication_job(connection_id).await?;
        Ok(job_optional_read(job.as_ref()))
    }

    pub async fn get_job_debug_info(&self, job_id: JobId) -> HistoryResult<JobDebugInfoRead> {
        DebugInfoAssembler {
            store: self.store.as_ref(),
            configs: self.configs.as_ref(),
            workflows: self.workflows.as_deref(),
            logs: self.logs(),
            platform_version: &self.settings.platform_version,
        }
        .debug_info(job_id)
        .await
    }

    pub async fn get_latest_running_sync_job(&self, connection_id: Uuid) -> HistoryResult<Option<JobRead>> {
        let job = self.planner().latest_non_terminal_sync_job(connection_id).await?;
        Ok(job.as_ref().map(job_read))
    }

    pub async fn get_connection_sync_progress(
        &self,
        connection_id: Uuid,
    ) -> HistoryResult<Vec<SyncProgressItem>> {
        sync_progress(self.store.as_ref(), connection_id).await
    }

    pub async fn get_latest_sync_job(&self, connection_id: Uuid) -> HistoryResult<Option<JobRead>> {
        let job = self.planner().latest_sync_job(connection_id).await?;
        Ok(job.as_ref().map(job_read))
    }

    pub async fn get_latest_sync_jobs_for_connections(
        &self,
        connection_ids: &[Uuid],
    ) -> HistoryResult<Vec<JobStatusSummary>> {
        self.planner()
            .latest_sync_jobs_for_connections(connection_ids)
            .await
    }

    pub async fn get_running_sync_jobs_for_connections(
        &self,
        connection_ids: &[Uuid],
    ) -> HistoryResult<Vec<JobRead>> {
        let jobs = self
            .planner()
            .running_sync_jobs_for_connections(connection_ids)
            .await?;
        Ok(jobs.iter().map(job_read).collect())
    }

    pub async fn get_attempt_normalization_statuses(
        &self,
        job_id: JobId,
    ) -> HistoryResult<Vec<AttemptNormalizationStatus>> {
        self.store.attempt_normalization_statuses(job_id).await
    }

    /// Sync mode of every stream in the job's configured catalog, ordered by stream.
    pub async fn streams_to_sync_mode(&self, job_id: JobId) -> HistoryResult<Vec<StreamSyncMode>> {
        let job = self.planner().get_job(job_id).await?;
        let modes: BTreeMap<StreamKey, SyncMode> = job.streams_to_sync_mode()?;
        Ok(modes
            .into_iter()
            .map(|(key, sync_mode)| StreamSyncMode {
                stream_name: key.name,
                stream_namespace: key.namespace,
                sync_mode,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryConfigLookup;
    use crate::error::{EntityKind, HistoryError};
    use crate::models::{
        AttemptStatus, ConfigType, ConfiguredCatalog, ConfiguredStream, StreamDescriptor,
    };
    use crate::query::Pagination;
    use crate::status::JobStatus;
    use crate::store::InMemoryJobStore;
    use crate::test_support::{at, attempt, attempt_stats, connection, job, scope, stats, stream};

    fn handler(store: Arc<InMemoryJobStore>, hydrate: bool) -> JobHistoryHandler {
        JobHistoryHandler::new(
            store,
            Arc::new(InMemoryConfigLookup::new()),
            HandlerSettings {
                hydrate_aggregated_stats: hydrate,
                ..HandlerSettings::default()
            },
        )
    }

    fn sync_request(config_id: String) -> JobListRequest {
        JobListRequest {
            config_types: vec![ConfigType::Sync],
            config_id: Some(config_id),
            ..JobListRequest::default()
        }
    }

    #[tokio::test]
    async fn test_empty_config_types_rejected_before_any_query() {
        let store = Arc::new(InMemoryJobStore::new());
        let handler = handler(store.clone(), true);
        let err = handler
            .list_jobs_for(&JobListRequest::default())
            .await
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_status_rejected_before_any_query() {
        let store = Arc::new(InMemoryJobStore::new());
        let handler = handler(store.clone(), false);
        let request = JobListRequest {
            statuses: Some(vec!["exploded".to_string()]),
            ..sync_request(scope(1))
        };
        let err = handler.list_jobs_for(&request).await.unwrap_err();
        assert!(matches!(err, HistoryError::UnrecognizedStatus(_)));
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_total_count_ignores_page_window() {
        let store = Arc::new(InMemoryJobStore::new());
        for id in 1..=5 {
            store.insert_job(job(id, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(id)));
        }
        let handler = handler(store, false);
        let request = JobListRequest {
            pagination: Some(Pagination {
                page_size: Some(2),
                row_offset: Some(1),
            }),
            ..sync_request(scope(1))
        };

        let list = handler.list_jobs_for(&request).await.unwrap();
        assert_eq!(list.total_job_count, 5);
        let ids: Vec<JobId> = list.jobs.iter().map(|view| view.job.id).collect();
        assert_eq!(ids, vec![4, 3]);
        assert!(list.jobs[0].job.aggregated_stats.is_none());
    }

    #[tokio::test]
    async fn test_listing_hydrates_when_enabled() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut done = job(1, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(1));
        done.attempts = vec![attempt(0, AttemptStatus::Succeeded)];
        store.insert_job(done);
        store.insert_attempt_stats(1, attempt_stats(0, vec![stream("users", None, stats(7, 7))]));

        let list = handler(store, true)
            .list_jobs_for(&sync_request(scope(1)))
            .await
            .unwrap();
        let aggregated = list.jobs[0].job.aggregated_stats.unwrap();
        assert_eq!(aggregated.records_committed, 7);
    }

    #[tokio::test]
    async fn test_workspace_listing_total_is_page_length() {
        let store = Arc::new(InMemoryJobStore::new());
        let workspace = Uuid::from_u128(77);
        for id in 1..=4 {
            store.insert_job(job(id, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(id)));
        }
        store.assign_workspace(&scope(1), workspace);

        let request = JobListForWorkspacesRequest {
            config_types: vec![ConfigType::Sync],
            workspace_ids: vec![workspace],
            pagination: Some(Pagination {
                page_size: Some(3),
                row_offset: None,
            }),
            ..JobListForWorkspacesRequest::default()
        };
        let list = handler(store, false)
            .list_jobs_for_workspaces(&request)
            .await
            .unwrap();
        assert_eq!(list.jobs.len(), 3);
        assert_eq!(list.total_job_count, 3);
    }

    #[tokio::test]
    async fn test_job_info_without_logs_forces_hydration() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut failed = job(3, &scope(1), ConfigType::Sync, JobStatus::Failed, at(0));
        failed.attempts = vec![attempt(0, AttemptStatus::Failed), attempt(1, AttemptStatus::Failed)];
        store.insert_job(failed);
        store.insert_attempt_stats(3, attempt_stats(0, vec![stream("users", None, stats(10, 5))]));
        store.insert_attempt_stats(3, attempt_stats(1, vec![stream("users", None, stats(10, 5))]));

        let info = handler(store, false).get_job_info_without_logs(3).await.unwrap();
        let streams = info.job.stream_aggregated_stats.unwrap();
        assert_eq!(streams[0].stats.records_emitted, 20);
        assert_eq!(info.attempts.len(), 2);
        assert!(info.attempts.iter().all(|a| a.logs.is_none()));
    }

    #[tokio::test]
    async fn test_job_info_includes_logs() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut running = job(4, &scope(1), ConfigType::Sync, JobStatus::Running, at(0));
        running.attempts = vec![attempt(0, AttemptStatus::Running)];
        store.insert_job(running);

        let info = handler(store, false).get_job_info(4).await.unwrap();
        assert_eq!(info.attempts.len(), 1);
        assert_eq!(info.attempts[0].logs, Some(crate::views::LogRead::default()));
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let handler = handler(Arc::new(InMemoryJobStore::new()), false);
        let err = handler.get_job_info_light(42).await.unwrap_err();
        assert!(matches!(
            err,
            HistoryError::NotFound {
                entity: EntityKind::Job,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_last_replication_job_absent_is_not_an_error() {
        let handler = handler(Arc::new(InMemoryJobStore::new()), false);
        let read = handler.get_last_replication_job(connection(1)).await.unwrap();
        assert!(read.job.is_none());
    }

    #[tokio::test]
    async fn test_last_replication_job_includes_resets() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(job(1, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(1)));
        store.insert_job(job(2, &scope(1), ConfigType::ResetConnection, JobStatus::Failed, at(2)));
        let handler = handler(store, false);

        let last = handler.get_last_replication_job(connection(1)).await.unwrap();
        assert_eq!(last.job.map(|job| job.id), Some(2));
        let latest_sync = handler.get_latest_sync_job(connection(1)).await.unwrap();
        assert_eq!(latest_sync.map(|job| job.id), Some(1));
    }

    #[tokio::test]
    async fn test_latest_running_sync_job_is_newest_non_terminal() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(job(1, &scope(1), ConfigType::Sync, JobStatus::Running, at(1)));
        store.insert_job(job(2, &scope(1), ConfigType::Sync, JobStatus::Incomplete, at(2)));
        store.insert_job(job(3, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(3)));
        let handler = handler(store, false);

        let running = handler.get_latest_running_sync_job(connection(1)).await.unwrap();
        assert_eq!(running.map(|job| job.id), Some(2));
        assert!(handler
            .get_latest_running_sync_job(connection(2))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_running_jobs_for_connections() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(job(1, &scope(1), ConfigType::Sync, JobStatus::Running, at(1)));
        store.insert_job(job(2, &scope(2), ConfigType::Sync, JobStatus::Pending, at(2)));
        store.insert_job(job(3, &scope(3), ConfigType::Sync, JobStatus::Running, at(3)));
        store.insert_job(job(4, &scope(1), ConfigType::Sync, JobStatus::Cancelled, at(4)));
        let handler = handler(store.clone(), false);

        let jobs = handler
            .get_running_sync_jobs_for_connections(&[connection(1), connection(2)])
            .await
            .unwrap();
        let ids: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
        assert_eq!(ids, vec![2, 1]);

        let before = store.query_count();
        assert!(handler
            .get_running_sync_jobs_for_connections(&[])
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.query_count(), before);
    }

    #[tokio::test]
    async fn test_latest_sync_jobs_for_connections() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(job(1, &scope(1), ConfigType::Sync, JobStatus::Failed, at(1)));
        store.insert_job(job(2, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(2)));
        store.insert_job(job(3, &scope(2), ConfigType::Sync, JobStatus::Running, at(3)));

        let summaries = handler(store, false)
            .get_latest_sync_jobs_for_connections(&[connection(1), connection(2)])
            .await
            .unwrap();
        let mut pairs: Vec<(String, JobId)> = summaries
            .into_iter()
            .map(|summary| (summary.connection_id, summary.job_id))
            .collect();
        pairs.sort();
        assert_eq!(pairs, vec![(scope(1), 2), (scope(2), 3)]);
    }

    #[tokio::test]
    async fn test_connection_sync_progress() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(job(9, &scope(1), ConfigType::Sync, JobStatus::Running, at(0)));
        store.insert_attempt_stats(9, attempt_stats(0, vec![stream("users", None, stats(100, 80))]));

        let items = handler(store, false)
            .get_connection_sync_progress(connection(1))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].records_loaded, 80);
    }

    #[tokio::test]
    async fn test_normalization_statuses_pass_through() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert_normalization_status(
            5,
            AttemptNormalizationStatus {
                attempt_number: 0,
                records_committed: Some(12),
                has_normalization_failed: false,
            },
        );
        let statuses = handler(store, false)
            .get_attempt_normalization_statuses(5)
            .await
            .unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].records_committed, Some(12));
    }

    fn configured(name: &str, namespace: Option<&str>, sync_mode: SyncMode) -> ConfiguredStream {
        ConfiguredStream {
            stream: StreamDescriptor {
                name: name.to_string(),
                namespace: namespace.map(str::to_string),
            },
            sync_mode,
        }
    }

    #[tokio::test]
    async fn test_streams_to_sync_mode() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut sync = job(6, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(0));
        sync.config.configured_catalog = Some(ConfiguredCatalog {
            streams: vec![
                configured("users", Some("public"), SyncMode::Incremental),
                configured("orders", None, SyncMode::FullRefresh),
            ],
        });
        store.insert_job(sync);

        let modes = handler(store, false).streams_to_sync_mode(6).await.unwrap();
        assert_eq!(
            modes,
            vec![
                StreamSyncMode {
                    stream_name: "orders".to_string(),
                    stream_namespace: None,
                    sync_mode: SyncMode::FullRefresh,
                },
                StreamSyncMode {
                    stream_name: "users".to_string(),
                    stream_namespace: Some("public".to_string()),
                    sync_mode: SyncMode::Incremental,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_debug_info_for_deleted_connection_is_not_found() {
        let store = Arc::new(InMemoryJobStore::new());
        store.insert_job(job(8, &scope(1), ConfigType::Sync, JobStatus::Failed, at(0)));
        let err = handler(store, false).get_job_debug_info(8).await.unwrap_err();
        assert!(matches!(
            err,
            HistoryError::NotFound {
                entity: EntityKind::Connection,
                ..
            }
        ));
    }
}
