// ABOUTME: In-process job store evaluating the same filter predicate as the SQL backend
// ABOUTME: Used by tests and for exercising the query layer without a database

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{JobFilter, JobOrder, JobStore, OrderByField, OrderDirection, PageWindow, ScopeSelector};
use crate::error::{HistoryError, HistoryResult};
use crate::models::{
    AttemptNormalizationStatus, AttemptStats, ConfigType, Job, JobId, JobStatusSummary,
};

#[derive(Default)]
struct Tables {
    jobs: Vec<Job>,
    attempt_stats: HashMap<JobId, Vec<AttemptStats>>,
    normalization: HashMap<JobId, Vec<AttemptNormalizationStatus>>,
    workspaces: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct InMemoryJobStore {
    tables: Mutex<Tables>,
    queries: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_job(&self, job: Job) {
        self.tables().jobs.push(job);
    }

    pub fn insert_attempt_stats(&self, job_id: JobId, stats: AttemptStats) {
        self.tables()
            .attempt_stats
            .entry(job_id)
            .or_default()
            .push(stats);
    }

    pub fn insert_normalization_status(&self, job_id: JobId, status: AttemptNormalizationStatus) {
        self.tables()
            .normalization
            .entry(job_id)
            .or_default()
            .push(status);
    }

    /// Records that the connection owning `scope` belongs to `workspace_id`.
    pub fn assign_workspace(&self, scope: &str, workspace_id: Uuid) {
        self.tables().workspaces.insert(scope.to_string(), workspace_id);
    }

    /// Makes every subsequent query fail as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(AtomicOrdering::SeqCst)
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_query(&self) -> HistoryResult<MutexGuard<'_, Tables>> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(HistoryError::transient("job store is unavailable"));
        }
        Ok(self.tables())
    }
}

fn matches(tables: &Tables, filter: &JobFilter, job: &Job) -> bool {
    let in_scope = match &filter.scope {
        ScopeSelector::Unscoped => true,
        ScopeSelector::Scope(scope) => &job.scope == scope,
        ScopeSelector::Scopes(scopes) => scopes.contains(&job.scope),
        ScopeSelector::Workspaces(workspace_ids) => tables
            .workspaces
            .get(&job.scope)
            .is_some_and(|workspace_id| workspace_ids.contains(workspace_id)),
    };

    in_scope
        && filter.config_types.contains(&job.config_type)
        && filter
            .statuses
            .as_ref()
            .map_or(true, |statuses| statuses.contains(&job.status))
        && filter.created_at.contains(job.created_at)
        && filter.updated_at.contains(job.updated_at)
}

fn compare(order: JobOrder, a: &Job, b: &Job) -> Ordering {
    let by_field = match order.field {
        OrderByField::CreatedAt => a.created_at.cmp(&b.created_at),
        OrderByField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    let ascending = by_field.then(a.id.cmp(&b.id));
    match order.direction {
        OrderDirection::Asc => ascending,
        OrderDirection::Desc => ascending.reverse(),
    }
}

fn select<'a>(tables: &'a Tables, filter: &JobFilter, order: JobOrder) -> Vec<&'a Job> {
    let mut selected: Vec<&Job> = tables
        .jobs
        .iter()
        .filter(|job| matches(tables, filter, job))
        .collect();
    selected.sort_by(|a, b| compare(order, a, b));
    selected
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn list_jobs(
        &self,
        filter: &JobFilter,
        order: JobOrder,
        window: Option<PageWindow>,
    ) -> HistoryResult<Vec<Job>> {
        let tables = self.begin_query()?;
        let selected = select(&tables, filter, order).into_iter();
        let jobs = match window {
            Some(window) => selected
                .skip(window.offset as usize)
                .take(window.limit as usize)
                .cloned()
                .collect(),
            None => selected.cloned().collect(),
        };
        Ok(jobs)
    }

    async fn count_jobs(&self, filter: &JobFilter) -> HistoryResult<u64> {
        let tables = self.begin_query()?;
        let count = tables
            .jobs
            .iter()
            .filter(|job| matches(&tables, filter, job))
            .count();
        Ok(count as u64)
    }

    async fn job_position(
        &self,
        filter: &JobFilter,
        order: JobOrder,
        job_id: JobId,
    ) -> HistoryResult<Option<u64>> {
        let tables = self.begin_query()?;
        let position = select(&tables, filter, order)
            .iter()
            .position(|job| job.id == job_id)
            .map(|index| index as u64 + 1);
        Ok(position)
    }

    async fn get_job(&self, job_id: JobId) -> HistoryResult<Option<Job>> {
        let tables = self.begin_query()?;
        Ok(tables.jobs.iter().find(|job| job.id == job_id).cloned())
    }

    async fn latest_jobs_for_scopes(
        &self,
        scopes: &[String],
        config_types: &[ConfigType],
    ) -> HistoryResult<Vec<JobStatusSummary>> {
        let tables = self.begin_query()?;
        let mut summaries = Vec::new();
        for scope in scopes {
            if summaries
                .iter()
                .any(|summary: &JobStatusSummary| &summary.connection_id == scope)
            {
                continue;
            }
            let latest = tables
                .jobs
                .iter()
                .filter(|job| &job.scope == scope && config_types.contains(&job.config_type))
                .min_by(|a, b| compare(JobOrder::NEWEST_FIRST, a, b));
            if let Some(job) = latest {
                summaries.push(JobStatusSummary {
                    job_id: job.id,
                    connection_id: job.scope.clone(),
                    created_at: job.created_at,
                    status: job.status,
                });
            }
        }
        Ok(summaries)
    }

    async fn job_attempt_stats(&self, job_id: JobId) -> HistoryResult<Vec<AttemptStats>> {
        let tables = self.begin_query()?;
        Ok(tables.attempt_stats.get(&job_id).cloned().unwrap_or_default())
    }

    async fn attempt_stats(
        &self,
        job_id: JobId,
        attempt_number: i32,
    ) -> HistoryResult<AttemptStats> {
        let tables = self.begin_query()?;
        let stats = tables
            .attempt_stats
            .get(&job_id)
            .and_then(|all| all.iter().find(|s| s.attempt_number == attempt_number))
            .cloned()
            .unwrap_or(AttemptStats {
                attempt_number,
                ..AttemptStats::default()
            });
        Ok(stats)
    }

    async fn attempt_normalization_statuses(
        &self,
        job_id: JobId,
    ) -> HistoryResult<Vec<AttemptNormalizationStatus>> {
        let tables = self.begin_query()?;
        let mut statuses = tables.normalization.get(&job_id).cloned().unwrap_or_default();
        statuses.sort_by_key(|status| status.attempt_number);
        Ok(statuses)
    }
}
