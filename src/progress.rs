// ABOUTME: Per-stream progress of the sync currently running on a connection
// ABOUTME: Projects hydrated stream statistics of running jobs into progress items

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::HistoryResult;
use crate::hydrate::hydrate_with_stats;
use crate::models::JobId;
use crate::query::QueryPlanner;
use crate::store::JobStore;
use crate::views::{job_with_attempts_read, JobWithAttemptsRead};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgressItem {
    pub job_id: JobId,
    pub stream_name: String,
    pub stream_namespace: Option<String>,
    pub records_extracted: i64,
    pub records_loaded: i64,
    pub bytes_extracted: i64,
    pub bytes_loaded: i64,
    pub sync_started_at: Option<DateTime<Utc>>,
}

/// Flattens hydrated job views into progress items.
///
/// Job id and start time of every item come from the first (newest) view. Connections are
/// expected to run at most one sync at a time; if several are running, items of the older
/// jobs carry the newest job's id and start time.
pub fn progress_items(views: &[JobWithAttemptsRead]) -> Vec<SyncProgressItem> {
    let Some(newest) = views.first() else {
        return Vec::new();
    };

    views
        .iter()
        .flat_map(|view| view.job.stream_aggregated_stats.iter().flatten())
        .map(|stream| SyncProgressItem {
            job_id: newest.job.id,
            stream_name: stream.stream_name.clone(),
            stream_namespace: stream.stream_namespace.clone(),
            records_extracted: stream.stats.records_emitted,
            records_loaded: stream.stats.records_committed,
            bytes_extracted: stream.stats.bytes_emitted,
            bytes_loaded: stream.stats.bytes_committed,
            sync_started_at: newest.job.started_at,
        })
        .collect()
}

/// Progress of the connection's running sync; empty when nothing is running.
pub async fn sync_progress(store: &dyn JobStore, connection_id: Uuid) -> HistoryResult<Vec<SyncProgressItem>> {
    let jobs = QueryPlanner::new(store)
        .running_sync_jobs_for_connections(&[connection_id])
        .await?;
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    if jobs.len() > 1 {
        tracing::warn!(
            %connection_id,
            running = jobs.len(),
            "More than one sync running for connection; reporting against the newest"
        );
    }

    let mut views: Vec<JobWithAttemptsRead> = jobs.iter().map(job_with_attempts_read).collect();
    hydrate_with_stats(store, &mut views, &jobs, true).await?;
    Ok(progress_items(&views))
}
