// ABOUTME: Turns listing requests into store filters and runs paginated job queries
// ABOUTME: Also answers the "latest job" lookups used by connection views

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{EntityKind, HistoryError, HistoryResult};
use crate::models::{ConfigType, Job, JobId, JobStatusSummary, REPLICATION_TYPES, SYNC_REPLICATION_TYPES};
use crate::status::{map_to_domain_statuses, NON_TERMINAL_STATUSES};
use crate::store::{
    JobFilter, JobOrder, JobStore, OrderByField, OrderDirection, PageWindow, ScopeSelector, TimeRange,
};

pub const DEFAULT_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub page_size: Option<u32>,
    pub row_offset: Option<u32>,
}

/// Listing of jobs owned by one scope (or unscoped).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobListRequest {
    pub config_types: Vec<ConfigType>,
    pub config_id: Option<String>,
    /// External status tokens, matched case-insensitively.
    pub statuses: Option<Vec<String>>,
    pub created_at_start: Option<DateTime<Utc>>,
    pub created_at_end: Option<DateTime<Utc>>,
    pub updated_at_start: Option<DateTime<Utc>>,
    pub updated_at_end: Option<DateTime<Utc>>,
    pub pagination: Option<Pagination>,
    pub including_job_id: Option<JobId>,
    pub order_by_field: Option<String>,
    pub order_by_method: Option<String>,
}

/// Listing of jobs across the connections of several workspaces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobListForWorkspacesRequest {
    pub config_types: Vec<ConfigType>,
    pub workspace_ids: Vec<Uuid>,
    pub statuses: Option<Vec<String>>,
    pub created_at_start: Option<DateTime<Utc>>,
    pub created_at_end: Option<DateTime<Utc>>,
    pub updated_at_start: Option<DateTime<Utc>>,
    pub updated_at_end: Option<DateTime<Utc>>,
    pub pagination: Option<Pagination>,
    pub order_by_field: Option<String>,
    pub order_by_method: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    Offset { page_size: u32, row_offset: u32 },
    /// The smallest whole number of pages that contains the job.
    IncludingJob { job_id: JobId, page_size: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListJobsQuery {
    pub filter: JobFilter,
    pub order: JobOrder,
    pub page: PageRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total_count: u64,
}

struct FilterArgs<'a> {
    config_types: &'a [ConfigType],
    scope: ScopeSelector,
    statuses: Option<&'a [String]>,
    created_at: TimeRange,
    updated_at: TimeRange,
}

fn build_filter(args: FilterArgs<'_>) -> HistoryResult<JobFilter> {
    if args.config_types.is_empty() {
        return Err(HistoryError::invalid("Must include at least one configType."));
    }

    let mut config_types = args.config_types.to_vec();
    config_types.sort();
    config_types.dedup();

    let statuses = match args.statuses {
        Some(tokens) if !tokens.is_empty() => Some(map_to_domain_statuses(tokens)?),
        _ => None,
    };

    Ok(JobFilter {
        config_types,
        scope: args.scope,
        statuses,
        created_at: args.created_at,
        updated_at: args.updated_at,
    })
}

fn build_order(field: Option<&str>, direction: Option<&str>) -> HistoryResult<JobOrder> {
    Ok(JobOrder {
        field: field.map(str::parse::<OrderByField>).transpose()?.unwrap_or_default(),
        direction: direction.map(str::parse::<OrderDirection>).transpose()?.unwrap_or_default(),
    })
}

fn build_page(
    pagination: Option<Pagination>,
    including_job_id: Option<JobId>,
    default_page_size: u32,
) -> HistoryResult<PageRequest> {
    let pagination = pagination.unwrap_or_default();
    let page_size = pagination.page_size.unwrap_or(default_page_size);
    if page_size == 0 {
        return Err(HistoryError::invalid("pageSize must be greater than zero"));
    }

    Ok(match including_job_id {
        Some(job_id) => PageRequest::IncludingJob { job_id, page_size },
        None => PageRequest::Offset {
            page_size,
            row_offset: pagination.row_offset.unwrap_or(0),
        },
    })
}

/// Validates a scoped listing request and turns it into a store query.
pub fn plan_job_list(request: &JobListRequest, default_page_size: u32) -> HistoryResult<ListJobsQuery> {
    let scope = match &request.config_id {
        Some(config_id) => ScopeSelector::Scope(config_id.clone()),
        None => ScopeSelector::Unscoped,
    };
    let filter = build_filter(FilterArgs {
        config_types: &request.config_types,
        scope,
        statuses: request.statuses.as_deref(),
        created_at: TimeRange::new(request.created_at_start, request.created_at_end),
        updated_at: TimeRange::new(request.updated_at_start, request.updated_at_end),
    })?;

    Ok(ListJobsQuery {
        filter,
        order: build_order(request.order_by_field.as_deref(), request.order_by_method.as_deref())?,
        page: build_page(request.pagination, request.including_job_id, default_page_size)?,
    })
}

/// Validates a workspace listing request and turns it into a store query.
pub fn plan_workspace_job_list(
    request: &JobListForWorkspacesRequest,
    default_page_size: u32,
) -> HistoryResult<ListJobsQuery> {
    let filter = build_filter(FilterArgs {
        config_types: &request.config_types,
        scope: ScopeSelector::Workspaces(request.workspace_ids.clone()),
        statuses: request.statuses.as_deref(),
        created_at: TimeRange::new(request.created_at_start, request.created_at_end),
        updated_at: TimeRange::new(request.updated_at_start, request.updated_at_end),
    })?;

    Ok(ListJobsQuery {
        filter,
        order: build_order(request.order_by_field.as_deref(), request.order_by_method.as_deref())?,
        page: build_page(request.pagination, None, default_page_size)?,
    })
}

fn connection_scopes(connection_ids: &[Uuid]) -> Vec<String> {
    connection_ids.iter().map(Uuid::to_string).collect()
}

/// Runs planned queries and the "latest job" lookups against a store.
pub struct QueryPlanner<'a> {
    store: &'a dyn JobStore,
}

impl<'a> QueryPlanner<'a> {
    pub fn new(store: &'a dyn JobStore) -> Self {
        Self { store }
    }

    /// The page of jobs selected by `query`.
    pub async fn list_jobs(&self, query: &ListJobsQuery) -> HistoryResult<Vec<Job>> {
        match query.page {
            PageRequest::Offset {
                page_size,
                row_offset,
            } => {
                let window = PageWindow {
                    limit: page_size,
                    offset: row_offset,
                };
                self.store.list_jobs(&query.filter, query.order, Some(window)).await
            }
            PageRequest::IncludingJob { job_id, page_size } => {
                // Cursor pages only honour config types and scope, newest first.
                let cursor = JobFilter::new(query.filter.config_types.clone(), query.filter.scope.clone());
                let Some(position) = self
                    .store
                    .job_position(&cursor, JobOrder::NEWEST_FIRST, job_id)
                    .await?
                else {
                    tracing::debug!(job_id, "Requested job is not part of the listing");
                    return Ok(Vec::new());
                };
                let pages = position.div_ceil(u64::from(page_size));
                let limit = u32::try_from(pages * u64::from(page_size)).unwrap_or(u32::MAX);
                self.store
                    .list_jobs(&cursor, JobOrder::NEWEST_FIRST, Some(PageWindow { limit, offset: 0 }))
                    .await
            }
        }
    }

    /// Jobs matching the query's filter, ignoring its page.
    pub async fn count_jobs(&self, query: &ListJobsQuery) -> HistoryResult<u64> {
        self.store.count_jobs(&query.filter).await
    }

    pub async fn list_jobs_with_count(&self, query: &ListJobsQuery) -> HistoryResult<JobPage> {
        let jobs = self.list_jobs(query).await?;
        let total_count = self.count_jobs(query).await?;
        tracing::debug!(returned = jobs.len(), total_count, "Listed jobs");
        Ok(JobPage { jobs, total_count })
    }

    pub async fn get_job(&self, job_id: JobId) -> HistoryResult<Job> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| HistoryError::not_found(EntityKind::Job, job_id))
    }

    async fn newest(&self, filter: JobFilter) -> HistoryResult<Option<Job>> {
        let window = PageWindow { limit: 1, offset: 0 };
        let jobs = self
            .store
            .list_jobs(&filter, JobOrder::NEWEST_FIRST, Some(window))
            .await?;
        Ok(jobs.into_iter().next())
    }

    /// Most recent sync job of the connection that has not finished.
    pub async fn latest_non_terminal_sync_job(&self, connection_id: Uuid) -> HistoryResult<Option<Job>> {
        // One non-terminal sync per connection is expected; newest-first ordering makes the
        // first row the authoritative one when that does not hold.
        let filter = JobFilter::new(
            SYNC_REPLICATION_TYPES.to_vec(),
            ScopeSelector::Scope(connection_id.to_string()),
        )
        .with_statuses(NON_TERMINAL_STATUSES.to_vec());
        self.newest(filter).await
    }

    /// Most recent sync job of the connection, whatever its status.
    pub async fn latest_sync_job(&self, connection_id: Uuid) -> HistoryResult<Option<Job>> {
        let filter = JobFilter::new(
            SYNC_REPLICATION_TYPES.to_vec(),
            ScopeSelector::Scope(connection_id.to_string()),
        );
        self.newest(filter).await
    }

    /// Most recent job of any replication type (sync, reset, refresh, clear).
    pub async fn last_replication_job(&self, connection_id: Uuid) -> HistoryResult<Option<Job>> {
        let filter = JobFilter::new(
            REPLICATION_TYPES.to_vec(),
            ScopeSelector::Scope(connection_id.to_string()),
        );
        self.newest(filter).await
    }

    pub async fn latest_sync_jobs_for_connections(
        &self,
        connection_ids: &[Uuid],
    ) -> HistoryResult<Vec<JobStatusSummary>> {
        if connection_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .latest_jobs_for_scopes(&connection_scopes(connection_ids), &SYNC_REPLICATION_TYPES)
            .await
    }

    /// Every unfinished sync job of the connections, newest first.
    pub async fn running_sync_jobs_for_connections(
        &self,
        connection_ids: &[Uuid],
    ) -> HistoryResult<Vec<Job>> {
        if connection_ids.is_empty() {
            return Ok(Vec::new());
        }
        let filter = JobFilter::new(
            SYNC_REPLICATION_TYPES.to_vec(),
            ScopeSelector::Scopes(connection_scopes(connection_ids)),
        )
        .with_statuses(NON_TERMINAL_STATUSES.to_vec());
        self.store.list_jobs(&filter, JobOrder::NEWEST_FIRST, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::JobStatus;
    use crate::store::InMemoryJobStore;
    use crate::test_support::{at, connection, job, scope};

    fn request(config_types: Vec<ConfigType>) -> JobListRequest {
        JobListRequest {
            config_types,
            config_id: Some(scope(1)),
            ..JobListRequest::default()
        }
    }

    /// Twelve sync jobs for connection 1, ids 1..=12, created one minute apart.
    fn store_with_history() -> InMemoryJobStore {
        let store = InMemoryJobStore::new();
        for id in 1..=12 {
            let status = if id % 3 == 0 { JobStatus::Failed } else { JobStatus::Succeeded };
            store.insert_job(job(id, &scope(1), ConfigType::Sync, status, at(id)));
        }
        store.insert_job(job(13, &scope(2), ConfigType::Sync, JobStatus::Running, at(13)));
        store
    }

    fn ids(jobs: &[Job]) -> Vec<JobId> {
        jobs.iter().map(|j| j.id).collect()
    }

    #[test]
    fn test_plan_defaults() {
        let query = plan_job_list(&request(vec![ConfigType::Sync]), DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(query.order, JobOrder::NEWEST_FIRST);
        assert_eq!(
            query.page,
            PageRequest::Offset {
                page_size: 200,
                row_offset: 0
            }
        );
        assert_eq!(query.filter.scope, ScopeSelector::Scope(scope(1)));
        assert!(query.filter.statuses.is_none());
    }

    #[test]
    fn test_plan_rejects_empty_config_types() {
        let err = plan_job_list(&request(vec![]), DEFAULT_PAGE_SIZE).unwrap_err();
        assert!(matches!(err, HistoryError::InvalidArgument(_)));
    }

    #[test]
    fn test_plan_including_job_takes_precedence() {
        let mut req = request(vec![ConfigType::Sync]);
        req.pagination = Some(Pagination {
            page_size: Some(5),
            row_offset: Some(40),
        });
        req.including_job_id = Some(7);
        let query = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(
            query.page,
            PageRequest::IncludingJob {
                job_id: 7,
                page_size: 5
            }
        );
    }

    #[test]
    fn test_plan_validates_order_and_statuses() {
        let mut req = request(vec![ConfigType::Sync]);
        req.order_by_field = Some("updatedAt".into());
        req.order_by_method = Some("ASC".into());
        req.statuses = Some(vec!["Running".into(), "PENDING".into()]);
        let query = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(query.order.field, OrderByField::UpdatedAt);
        assert_eq!(query.order.direction, OrderDirection::Asc);
        assert_eq!(
            query.filter.statuses,
            Some(vec![JobStatus::Running, JobStatus::Pending])
        );

        req.order_by_field = Some("scope".into());
        assert!(plan_job_list(&req, DEFAULT_PAGE_SIZE).is_err());

        req.order_by_field = None;
        req.statuses = Some(vec!["queued".into()]);
        let err = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap_err();
        assert!(matches!(err, HistoryError::UnrecognizedStatus(_)));
    }

    #[test]
    fn test_plan_rejects_zero_page_size() {
        let mut req = request(vec![ConfigType::Sync]);
        req.pagination = Some(Pagination {
            page_size: Some(0),
            row_offset: None,
        });
        assert!(plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap_err().is_invalid_argument());
    }

    #[tokio::test]
    async fn test_total_count_ignores_window() {
        let store = store_with_history();
        let planner = QueryPlanner::new(&store);

        for (page_size, row_offset) in [(1, 0), (5, 5), (200, 0), (3, 11), (4, 50)] {
            let mut req = request(vec![ConfigType::Sync]);
            req.pagination = Some(Pagination {
                page_size: Some(page_size),
                row_offset: Some(row_offset),
            });
            let query = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap();
            let page = planner.list_jobs_with_count(&query).await.unwrap();
            assert_eq!(page.total_count, 12);
            assert!(page.jobs.len() <= page_size as usize);
        }
    }

    #[tokio::test]
    async fn test_count_uses_status_filter() {
        let store = store_with_history();
        let planner = QueryPlanner::new(&store);
        let mut req = request(vec![ConfigType::Sync]);
        req.statuses = Some(vec!["failed".into()]);
        let query = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap();
        let page = planner.list_jobs_with_count(&query).await.unwrap();
        assert_eq!(page.total_count, 4);
        assert_eq!(ids(&page.jobs), vec![12, 9, 6, 3]);
    }

    #[tokio::test]
    async fn test_default_order_newest_first() {
        let store = store_with_history();
        let planner = QueryPlanner::new(&store);
        let mut req = request(vec![ConfigType::Sync]);
        req.config_id = None;
        let query = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap();
        let jobs = planner.list_jobs(&query).await.unwrap();
        assert_eq!(jobs[0].id, 13);
    }

    #[tokio::test]
    async fn test_including_job_id_page_contains_job() {
        let store = store_with_history();
        let planner = QueryPlanner::new(&store);

        for target in 1..=12 {
            let mut req = request(vec![ConfigType::Sync]);
            req.pagination = Some(Pagination {
                page_size: Some(5),
                row_offset: Some(9),
            });
            req.including_job_id = Some(target);
            let query = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap();
            let jobs = planner.list_jobs(&query).await.unwrap();
            assert!(ids(&jobs).contains(&target), "page for {} missing it", target);
            assert_eq!(jobs.len() % 5, if jobs.len() == 12 { 2 } else { 0 });
        }
    }

    #[tokio::test]
    async fn test_including_job_id_rounds_up_to_whole_pages() {
        let store = store_with_history();
        let planner = QueryPlanner::new(&store);
        let mut req = request(vec![ConfigType::Sync]);
        req.pagination = Some(Pagination {
            page_size: Some(5),
            row_offset: None,
        });
        // Job 6 is seventh newest: two pages.
        req.including_job_id = Some(6);
        let query = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap();
        let jobs = planner.list_jobs(&query).await.unwrap();
        assert_eq!(ids(&jobs), vec![12, 11, 10, 9, 8, 7, 6, 5, 4, 3]);
    }

    #[tokio::test]
    async fn test_including_job_ignores_status_filter_and_order() {
        let store = InMemoryJobStore::new();
        store.insert_job(job(1, &scope(1), ConfigType::Sync, JobStatus::Failed, at(1)));
        store.insert_job(job(2, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(2)));
        let planner = QueryPlanner::new(&store);

        let mut req = request(vec![ConfigType::Sync]);
        req.statuses = Some(vec!["succeeded".into()]);
        req.order_by_method = Some("ASC".into());
        req.including_job_id = Some(1);
        let query = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap();

        let page = planner.list_jobs_with_count(&query).await.unwrap();
        assert_eq!(ids(&page.jobs), vec![2, 1]);
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn test_including_job_outside_scope_is_empty() {
        let store = store_with_history();
        let planner = QueryPlanner::new(&store);
        let mut req = request(vec![ConfigType::Sync]);
        req.including_job_id = Some(13);
        let query = plan_job_list(&req, DEFAULT_PAGE_SIZE).unwrap();
        assert!(planner.list_jobs(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_non_terminal_picks_newest() {
        let store = InMemoryJobStore::new();
        store.insert_job(job(1, &scope(1), ConfigType::Sync, JobStatus::Running, at(1)));
        store.insert_job(job(2, &scope(1), ConfigType::Sync, JobStatus::Pending, at(5)));
        store.insert_job(job(3, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(9)));
        store.insert_job(job(4, &scope(1), ConfigType::ResetConnection, JobStatus::Running, at(10)));
        let planner = QueryPlanner::new(&store);

        let latest = planner.latest_non_terminal_sync_job(connection(1)).await.unwrap();
        assert_eq!(latest.map(|j| j.id), Some(2));
        assert!(planner
            .latest_non_terminal_sync_job(connection(2))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_latest_sync_and_replication_jobs() {
        let store = InMemoryJobStore::new();
        store.insert_job(job(1, &scope(1), ConfigType::Sync, JobStatus::Succeeded, at(1)));
        store.insert_job(job(2, &scope(1), ConfigType::Refresh, JobStatus::Failed, at(2)));
        store.insert_job(job(3, &scope(1), ConfigType::ResetConnection, JobStatus::Cancelled, at(3)));
        store.insert_job(job(4, &scope(1), ConfigType::DiscoverSchema, JobStatus::Succeeded, at(4)));
        let planner = QueryPlanner::new(&store);

        let latest_sync = planner.latest_sync_job(connection(1)).await.unwrap();
        assert_eq!(latest_sync.map(|j| j.id), Some(2));
        let last_replication = planner.last_replication_job(connection(1)).await.unwrap();
        assert_eq!(last_replication.map(|j| j.id), Some(3));
    }

    #[tokio::test]
    async fn test_running_sync_jobs_for_connections() {
        let store = store_with_history();
        store.insert_job(job(14, &scope(3), ConfigType::Sync, JobStatus::Incomplete, at(14)));
        let planner = QueryPlanner::new(&store);

        let running = planner
            .running_sync_jobs_for_connections(&[connection(1), connection(2), connection(3)])
            .await
            .unwrap();
        assert_eq!(ids(&running), vec![14, 13]);
        assert!(planner
            .running_sync_jobs_for_connections(&[])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_get_job_not_found() {
        let store = InMemoryJobStore::new();
        let err = QueryPlanner::new(&store).get_job(42).await.unwrap_err();
        assert!(matches!(
            err,
            HistoryError::NotFound {
                entity: EntityKind::Job,
                ..
            }
        ));
    }
}
