// ABOUTME: Read-only query interface over the persisted job history
// ABOUTME: Filter, ordering and window types shared by every store backend

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{HistoryError, HistoryResult};
use crate::models::{
    AttemptNormalizationStatus, AttemptStats, ConfigType, Job, JobId, JobStatusSummary,
};
use crate::status::JobStatus;

pub use memory::InMemoryJobStore;
pub use postgres::PgJobStore;

/// Which jobs a query is restricted to, by owner.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScopeSelector {
    #[default]
    Unscoped,
    /// A single scope (connection) id.
    Scope(String),
    /// Any of several scope ids.
    Scopes(Vec<String>),
    /// Jobs of connections belonging to any of the workspaces.
    Workspaces(Vec<Uuid>),
}

/// Inclusive time bounds; a missing side is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        TimeRange { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }
}

/// Predicate shared by page, count and position queries.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFilter {
    pub config_types: Vec<ConfigType>,
    pub scope: ScopeSelector,
    pub statuses: Option<Vec<JobStatus>>,
    pub created_at: TimeRange,
    pub updated_at: TimeRange,
}

impl JobFilter {
    pub fn new(config_types: Vec<ConfigType>, scope: ScopeSelector) -> Self {
        JobFilter {
            config_types,
            scope,
            statuses: None,
            created_at: TimeRange::default(),
            updated_at: TimeRange::default(),
        }
    }

    pub fn with_statuses(mut self, statuses: Vec<JobStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderByField {
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl FromStr for OrderByField {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" => Ok(OrderByField::CreatedAt),
            "updatedAt" => Ok(OrderByField::UpdatedAt),
            other => Err(HistoryError::invalid(format!(
                "cannot order jobs by '{}', expected createdAt or updatedAt",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for OrderDirection {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(OrderDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(OrderDirection::Desc)
        } else {
            Err(HistoryError::invalid(format!(
                "unknown order direction '{}', expected ASC or DESC",
                s
            )))
        }
    }
}

/// Ordering of a listing. Ties are broken by job id in the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobOrder {
    pub field: OrderByField,
    pub direction: OrderDirection,
}

impl JobOrder {
    pub const NEWEST_FIRST: JobOrder = JobOrder {
        field: OrderByField::CreatedAt,
        direction: OrderDirection::Desc,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u32,
    pub offset: u32,
}

/// Query interface of the job store.
///
/// Implementations must return jobs with their attempts in attempt-number order and must
/// honor `JobOrder` exactly; "latest" lookups take the first row of a newest-first listing.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Jobs matching `filter` in `order`, restricted to `window` when given.
    async fn list_jobs(
        &self,
        filter: &JobFilter,
        order: JobOrder,
        window: Option<PageWindow>,
    ) -> HistoryResult<Vec<Job>>;

    /// Number of jobs matching `filter`.
    async fn count_jobs(&self, filter: &JobFilter) -> HistoryResult<u64>;

    /// 1-based position of `job_id` among jobs matching `filter` in `order`, if it matches.
    async fn job_position(
        &self,
        filter: &JobFilter,
        order: JobOrder,
        job_id: JobId,
    ) -> HistoryResult<Option<u64>>;

    async fn get_job(&self, job_id: JobId) -> HistoryResult<Option<Job>>;

    /// Newest job of `config_types` for each scope, in one round trip.
    async fn latest_jobs_for_scopes(
        &self,
        scopes: &[String],
        config_types: &[ConfigType],
    ) -> HistoryResult<Vec<JobStatusSummary>>;

    /// Per-attempt statistics of a job, one entry per attempt that recorded any.
    async fn job_attempt_stats(&self, job_id: JobId) -> HistoryResult<Vec<AttemptStats>>;

    /// Statistics of a single attempt; empty when nothing was recorded.
    async fn attempt_stats(&self, job_id: JobId, attempt_number: i32)
        -> HistoryResult<AttemptStats>;

    async fn attempt_normalization_statuses(
        &self,
        job_id: JobId,
    ) -> HistoryResult<Vec<AttemptNormalizationStatus>>;
}
