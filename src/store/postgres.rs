// ABOUTME: PostgreSQL job store backed by tokio-postgres
// ABOUTME: One WHERE-clause builder feeds the page, count and position queries

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};

use super::{JobFilter, JobOrder, JobStore, OrderByField, OrderDirection, PageWindow, ScopeSelector};
use crate::error::{HistoryError, HistoryResult};
use crate::models::{
    Attempt, AttemptNormalizationStatus, AttemptStats, ConfigType, Job, JobConfig, JobId,
    JobStatusSummary, StreamSyncStats, SyncOutput, SyncStats,
};
use crate::status::JobStatus;

const JOB_COLUMNS: &str = "jobs.id, CAST(jobs.config_type AS VARCHAR) AS config_type, jobs.scope, \
     jobs.config, CAST(jobs.status AS VARCHAR) AS status, jobs.started_at, jobs.created_at, \
     jobs.updated_at";

const ATTEMPT_COLUMNS: &str = "attempts.job_id, attempts.attempt_number, \
     CAST(attempts.status AS VARCHAR) AS status, attempts.log_path, attempts.output, \
     attempts.failure_summary, attempts.created_at, attempts.updated_at, attempts.ended_at";

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Opens a client over TLS and drives the connection on a background task.
pub async fn connect(url: &str) -> HistoryResult<Client> {
    let connector = TlsConnector::builder()
        .build()
        .map_err(|e| HistoryError::transient(format!("failed to build TLS connector: {}", e)))?;
    let (client, connection) = tokio_postgres::connect(url, MakeTlsConnector::new(connector)).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Database connection error: {}", e);
        }
    });

    tracing::debug!("Connected to job database");
    Ok(client)
}

/// A parameterised WHERE clause; placeholders are numbered in push order.
#[derive(Default)]
struct SqlPredicate {
    conditions: Vec<String>,
    params: Vec<SqlParam>,
}

impl SqlPredicate {
    fn push(&mut self, condition: impl FnOnce(usize) -> String, param: SqlParam) {
        self.params.push(param);
        self.conditions.push(condition(self.params.len()));
    }

    fn next_placeholder(&self) -> usize {
        self.params.len() + 1
    }

    fn clause(&self) -> String {
        if self.conditions.is_empty() {
            "TRUE".to_string()
        } else {
            self.conditions.join(" AND ")
        }
    }

    fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

fn build_predicate(filter: &JobFilter) -> SqlPredicate {
    let mut predicate = SqlPredicate::default();

    let config_types: Vec<String> = filter
        .config_types
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();
    predicate.push(
        |n| format!("CAST(jobs.config_type AS VARCHAR) = ANY(${})", n),
        Box::new(config_types),
    );

    match &filter.scope {
        ScopeSelector::Unscoped => {}
        ScopeSelector::Scope(scope) => {
            predicate.push(|n| format!("jobs.scope = ${}", n), Box::new(scope.clone()));
        }
        ScopeSelector::Scopes(scopes) => {
            predicate.push(|n| format!("jobs.scope = ANY(${})", n), Box::new(scopes.clone()));
        }
        ScopeSelector::Workspaces(workspace_ids) => {
            predicate.push(
                |n| {
                    format!(
                        "jobs.scope IN (SELECT CAST(connection.id AS VARCHAR) FROM connection \
                         JOIN actor ON actor.id = connection.source_id \
                         WHERE actor.workspace_id = ANY(${}))",
                        n
                    )
                },
                Box::new(workspace_ids.clone()),
            );
        }
    }

    if let Some(statuses) = &filter.statuses {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        predicate.push(
            |n| format!("CAST(jobs.status AS VARCHAR) = ANY(${})", n),
            Box::new(statuses),
        );
    }

    for (column, range) in [("created_at", &filter.created_at), ("updated_at", &filter.updated_at)] {
        if let Some(start) = range.start {
            predicate.push(|n| format!("jobs.{} >= ${}", column, n), Box::new(start));
        }
        if let Some(end) = range.end {
            predicate.push(|n| format!("jobs.{} <= ${}", column, n), Box::new(end));
        }
    }

    predicate
}

fn order_clause(order: JobOrder) -> String {
    let column = match order.field {
        OrderByField::CreatedAt => "jobs.created_at",
        OrderByField::UpdatedAt => "jobs.updated_at",
    };
    let direction = match order.direction {
        OrderDirection::Asc => "ASC",
        OrderDirection::Desc => "DESC",
    };
    format!("{column} {direction}, jobs.id {direction}")
}

fn job_from_row(row: &Row) -> HistoryResult<Job> {
    let config: Option<Value> = row.try_get("config")?;
    let status: String = row.try_get("status")?;
    let config_type: String = row.try_get("config_type")?;
    Ok(Job {
        id: row.try_get("id")?,
        config_type: config_type.parse()?,
        scope: row.try_get("scope")?,
        config: config.as_ref().map(JobConfig::from_json).unwrap_or_default(),
        status: status.parse::<JobStatus>()?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        attempts: Vec::new(),
    })
}

fn attempt_from_row(row: &Row) -> HistoryResult<Attempt> {
    let status: String = row.try_get("status")?;
    let output: Option<Value> = row.try_get("output")?;
    Ok(Attempt {
        attempt_number: row.try_get("attempt_number")?,
        status: status.parse()?,
        log_path: row.try_get("log_path")?,
        output: output.as_ref().and_then(SyncOutput::from_json),
        failure_summary: row.try_get("failure_summary")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn stats_from_row(row: &Row) -> HistoryResult<SyncStats> {
    let get = |column: &str| -> HistoryResult<i64> {
        Ok(row.try_get::<_, Option<i64>>(column)?.unwrap_or(0))
    };
    Ok(SyncStats {
        records_emitted: get("records_emitted")?,
        bytes_emitted: get("bytes_emitted")?,
        records_committed: get("records_committed")?,
        bytes_committed: get("bytes_committed")?,
    })
}

pub struct PgJobStore {
    client: Client,
}

impl PgJobStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> HistoryResult<Self> {
        Ok(Self::new(connect(url).await?))
    }

    /// Loads attempts for the given job rows and attaches them in attempt order.
    async fn with_attempts(&self, mut jobs: Vec<Job>) -> HistoryResult<Vec<Job>> {
        if jobs.is_empty() {
            return Ok(jobs);
        }
        let job_ids: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE attempts.job_id = ANY($1) \
             ORDER BY attempts.job_id, attempts.attempt_number"
        );
        let rows = self.client.query(sql.as_str(), &[&job_ids]).await?;

        let mut by_job: HashMap<JobId, Vec<Attempt>> = HashMap::new();
        for row in &rows {
            let job_id: JobId = row.try_get("job_id")?;
            by_job.entry(job_id).or_default().push(attempt_from_row(row)?);
        }
        for job in &mut jobs {
            job.attempts = by_job.remove(&job.id).unwrap_or_default();
        }
        Ok(jobs)
    }

    async fn fetch_attempt_stats(
        &self,
        job_id: JobId,
        attempt_number: Option<i32>,
    ) -> HistoryResult<Vec<AttemptStats>> {
        let totals = self
            .client
            .query(
                "SELECT attempts.attempt_number, sync_stats.records_emitted, sync_stats.bytes_emitted, \
                 sync_stats.records_committed, sync_stats.bytes_committed \
                 FROM attempts JOIN sync_stats ON sync_stats.attempt_id = attempts.id \
                 WHERE attempts.job_id = $1 AND ($2::INT IS NULL OR attempts.attempt_number = $2) \
                 ORDER BY attempts.attempt_number",
                &[&job_id, &attempt_number],
            )
            .await?;
        let streams = self
            .client
            .query(
                "SELECT attempts.attempt_number, stream_stats.stream_name, stream_stats.stream_namespace, \
                 stream_stats.records_emitted, stream_stats.bytes_emitted, \
                 stream_stats.records_committed, stream_stats.bytes_committed \
                 FROM attempts JOIN stream_stats ON stream_stats.attempt_id = attempts.id \
                 WHERE attempts.job_id = $1 AND ($2::INT IS NULL OR attempts.attempt_number = $2) \
                 ORDER BY attempts.attempt_number, stream_stats.stream_namespace, stream_stats.stream_name",
                &[&job_id, &attempt_number],
            )
            .await?;

        let mut by_attempt: BTreeMap<i32, AttemptStats> = BTreeMap::new();
        for row in &totals {
            let number: i32 = row.try_get("attempt_number")?;
            let entry = by_attempt.entry(number).or_insert_with(|| AttemptStats {
                attempt_number: number,
                ..AttemptStats::default()
            });
            entry.totals = stats_from_row(row)?;
        }
        for row in &streams {
            let number: i32 = row.try_get("attempt_number")?;
            let entry = by_attempt.entry(number).or_insert_with(|| AttemptStats {
                attempt_number: number,
                ..AttemptStats::default()
            });
            entry.streams.push(StreamSyncStats {
                stream_name: row.try_get("stream_name")?,
                stream_namespace: row.try_get("stream_namespace")?,
                stats: stats_from_row(row)?,
            });
        }
        Ok(by_attempt.into_values().collect())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn list_jobs(
        &self,
        filter: &JobFilter,
        order: JobOrder,
        window: Option<PageWindow>,
    ) -> HistoryResult<Vec<Job>> {
        let mut predicate = build_predicate(filter);
        let mut sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE {} ORDER BY {}",
            predicate.clause(),
            order_clause(order)
        );
        if let Some(window) = window {
            let limit = predicate.next_placeholder();
            sql.push_str(&format!(" LIMIT ${} OFFSET ${}", limit, limit + 1));
            predicate.params.push(Box::new(i64::from(window.limit)));
            predicate.params.push(Box::new(i64::from(window.offset)));
        }

        tracing::debug!(%sql, "Listing jobs");
        let rows = self.client.query(sql.as_str(), &predicate.param_refs()).await?;
        let jobs = rows.iter().map(job_from_row).collect::<HistoryResult<Vec<_>>>()?;
        self.with_attempts(jobs).await
    }

    async fn count_jobs(&self, filter: &JobFilter) -> HistoryResult<u64> {
        let predicate = build_predicate(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs WHERE {}", predicate.clause());
        let row = self.client.query_one(sql.as_str(), &predicate.param_refs()).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn job_position(
        &self,
        filter: &JobFilter,
        order: JobOrder,
        job_id: JobId,
    ) -> HistoryResult<Option<u64>> {
        let mut predicate = build_predicate(filter);
        let id_placeholder = predicate.next_placeholder();
        let sql = format!(
            "SELECT ranked.position FROM (\
             SELECT jobs.id, ROW_NUMBER() OVER (ORDER BY {}) AS position FROM jobs WHERE {}\
             ) ranked WHERE ranked.id = ${}",
            order_clause(order),
            predicate.clause(),
            id_placeholder
        );
        predicate.params.push(Box::new(job_id));
        let row = self.client.query_opt(sql.as_str(), &predicate.param_refs()).await?;
        match row {
            Some(row) => {
                let position: i64 = row.try_get("position")?;
                Ok(Some(position as u64))
            }
            None => Ok(None),
        }
    }

    async fn get_job(&self, job_id: JobId) -> HistoryResult<Option<Job>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE jobs.id = $1");
        let Some(row) = self.client.query_opt(sql.as_str(), &[&job_id]).await? else {
            return Ok(None);
        };
        let job = job_from_row(&row)?;
        Ok(self.with_attempts(vec![job]).await?.pop())
    }

    async fn latest_jobs_for_scopes(
        &self,
        scopes: &[String],
        config_types: &[ConfigType],
    ) -> HistoryResult<Vec<JobStatusSummary>> {
        if scopes.is_empty() {
            return Ok(Vec::new());
        }
        let config_types: Vec<String> = config_types.iter().map(|t| t.as_str().to_string()).collect();
        let rows = self
            .client
            .query(
                "SELECT DISTINCT ON (jobs.scope) jobs.id, jobs.scope, jobs.created_at, \
                 CAST(jobs.status AS VARCHAR) AS status FROM jobs \
                 WHERE jobs.scope = ANY($1) AND CAST(jobs.config_type AS VARCHAR) = ANY($2) \
                 ORDER BY jobs.scope, jobs.created_at DESC, jobs.id DESC",
                &[&scopes, &config_types],
            )
            .await?;

        rows.iter()
            .map(|row| -> HistoryResult<JobStatusSummary> {
                let status: String = row.try_get("status")?;
                let created_at: DateTime<Utc> = row.try_get("created_at")?;
                Ok(JobStatusSummary {
                    job_id: row.try_get("id")?,
                    connection_id: row.try_get("scope")?,
                    created_at,
                    status: status.parse()?,
                })
            })
            .collect()
    }

    async fn job_attempt_stats(&self, job_id: JobId) -> HistoryResult<Vec<AttemptStats>> {
        self.fetch_attempt_stats(job_id, None).await
    }

    async fn attempt_stats(
        &self,
        job_id: JobId,
        attempt_number: i32,
    ) -> HistoryResult<AttemptStats> {
        let stats = self.fetch_attempt_stats(job_id, Some(attempt_number)).await?;
        Ok(stats.into_iter().next().unwrap_or(AttemptStats {
            attempt_number,
            ..AttemptStats::default()
        }))
    }

    async fn attempt_normalization_statuses(
        &self,
        job_id: JobId,
    ) -> HistoryResult<Vec<AttemptNormalizationStatus>> {
        let rows = self
            .client
            .query(
                "SELECT attempts.attempt_number, \
                 CAST(attempts.output -> 'sync' -> 'standardSyncSummary' -> 'totalStats' ->> 'recordsCommitted' AS BIGINT) \
                 AS records_committed, normalization_summaries.failures \
                 FROM attempts LEFT JOIN normalization_summaries \
                 ON normalization_summaries.attempt_id = attempts.id \
                 WHERE attempts.job_id = $1 ORDER BY attempts.attempt_number",
                &[&job_id],
            )
            .await?;

        rows.iter()
            .map(|row| -> HistoryResult<AttemptNormalizationStatus> {
                let failures: Option<Value> = row.try_get("failures")?;
                Ok(AttemptNormalizationStatus {
                    attempt_number: row.try_get("attempt_number")?,
                    records_committed: row.try_get("records_committed")?,
                    has_normalization_failed: has_failures(failures.as_ref()),
                })
            })
            .collect()
    }
}

fn has_failures(failures: Option<&Value>) -> bool {
    match failures {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}
