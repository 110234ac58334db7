// ABOUTME: Merges stored attempt statistics into job and attempt views
// ABOUTME: Stats for the same stream are summed across the attempts of a job

use futures::future::try_join_all;
use std::collections::BTreeMap;

use crate::error::{HistoryError, HistoryResult};
use crate::models::{AttemptStats, Job, StreamKey, StreamSyncStats, SyncStats};
use crate::store::JobStore;
use crate::views::{AttemptRead, JobWithAttemptsRead};

/// Sums stream statistics per (name, namespace), ordered by stream identity.
pub fn merge_stream_stats<'a>(streams: impl IntoIterator<Item = &'a StreamSyncStats>) -> Vec<StreamSyncStats> {
    let mut merged: BTreeMap<StreamKey, SyncStats> = BTreeMap::new();
    for stream in streams {
        *merged.entry(stream.key()).or_default() += stream.stats;
    }
    merged
        .into_iter()
        .map(|(key, stats)| StreamSyncStats {
            stream_name: key.name,
            stream_namespace: key.namespace,
            stats,
        })
        .collect()
}

/// Fills one attempt view from its stored statistics.
pub fn hydrate_attempt(attempt: &mut AttemptRead, stats: &AttemptStats) {
    attempt.total_stats = Some(stats.totals);
    attempt.stream_stats = Some(merge_stream_stats(&stats.streams));
}

/// Fills a job view and its attempt views from the job's per-attempt statistics.
fn hydrate_job(view: &mut JobWithAttemptsRead, attempt_stats: &[AttemptStats]) {
    for attempt in &mut view.attempts {
        match attempt_stats.iter().find(|s| s.attempt_number == attempt.id) {
            Some(stats) => hydrate_attempt(attempt, stats),
            None => hydrate_attempt(
                attempt,
                &AttemptStats {
                    attempt_number: attempt.id,
                    ..AttemptStats::default()
                },
            ),
        }
    }

    let totals = attempt_stats
        .iter()
        .fold(SyncStats::default(), |acc, stats| acc + stats.totals);
    view.job.aggregated_stats = Some(totals);
    view.job.stream_aggregated_stats = Some(merge_stream_stats(
        attempt_stats.iter().flat_map(|stats| stats.streams.iter()),
    ));
}

/// Hydrates `views` in place; `views[i]` must be the view of `jobs[i]`.
///
/// With `enabled == false` the views are left untouched. Per-job fetches run
/// concurrently; results are applied in input order.
pub async fn hydrate_with_stats(
    store: &dyn JobStore,
    views: &mut [JobWithAttemptsRead],
    jobs: &[Job],
    enabled: bool,
) -> HistoryResult<()> {
    if !enabled {
        return Ok(());
    }
    if views.len() != jobs.len() {
        return Err(HistoryError::invalid(format!(
            "cannot hydrate {} job views from {} jobs",
            views.len(),
            jobs.len()
        )));
    }

    tracing::debug!(jobs = jobs.len(), "Fetching attempt stats for hydration");
    let fetched = try_join_all(jobs.iter().map(|job| store.job_attempt_stats(job.id))).await?;

    for ((view, job), stats) in views.iter_mut().zip(jobs).zip(fetched) {
        debug_assert_eq!(view.job.id, job.id);
        hydrate_job(view, &stats);
    }
    Ok(())
}
