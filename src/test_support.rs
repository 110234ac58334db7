// ABOUTME: Builders for jobs, attempts and statistics shared by unit tests
// ABOUTME: Only compiled for tests

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::models::{
    Attempt, AttemptStats, AttemptStatus, ConfigType, Job, JobConfig, JobId, StreamSyncStats,
    SyncStats,
};
use crate::status::JobStatus;

/// A fixed point in time `minutes` after the start of 2024.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

/// Deterministic connection id used as a job scope.
pub fn connection(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn scope(n: u128) -> String {
    connection(n).to_string()
}

pub fn job(id: JobId, scope: &str, config_type: ConfigType, status: JobStatus, created_at: DateTime<Utc>) -> Job {
    Job {
        id,
        config_type,
        scope: scope.to_string(),
        config: JobConfig::default(),
        status,
        created_at,
        updated_at: created_at,
        started_at: Some(created_at),
        attempts: Vec::new(),
    }
}

pub fn attempt(attempt_number: i32, status: AttemptStatus) -> Attempt {
    Attempt {
        attempt_number,
        status,
        log_path: None,
        output: None,
        failure_summary: None,
        created_at: at(attempt_number as i64),
        updated_at: at(attempt_number as i64),
        ended_at: None,
    }
}

pub fn stats(records_emitted: i64, records_committed: i64) -> SyncStats {
    SyncStats {
        records_emitted,
        bytes_emitted: records_emitted * 10,
        records_committed,
        bytes_committed: records_committed * 10,
    }
}

pub fn stream(name: &str, namespace: Option<&str>, stats: SyncStats) -> StreamSyncStats {
    StreamSyncStats {
        stream_name: name.to_string(),
        stream_namespace: namespace.map(str::to_string),
        stats,
    }
}

/// Attempt statistics whose totals are the sum of its streams.
pub fn attempt_stats(attempt_number: i32, streams: Vec<StreamSyncStats>) -> AttemptStats {
    let totals = streams
        .iter()
        .fold(SyncStats::default(), |acc, s| acc + s.stats);
    AttemptStats {
        attempt_number,
        totals,
        streams,
    }
}
