// ABOUTME: View records returned to callers and the pure functions that build them
// ABOUTME: Conversions take domain records and never touch the store

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::{Attempt, AttemptStatus, ConfigType, Job, JobId, StreamSyncStats, SyncStats};
use crate::status::JobStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRead {
    pub id: JobId,
    pub config_type: ConfigType,
    pub config_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Totals summed over all attempts; set by hydration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregated_stats: Option<SyncStats>,
    /// Per-stream totals summed over all attempts; set by hydration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_aggregated_stats: Option<Vec<StreamSyncStats>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRead {
    /// The attempt number.
    pub id: i32,
    pub status: AttemptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub bytes_synced: Option<i64>,
    pub records_synced: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_stats: Option<SyncStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_stats: Option<Vec<StreamSyncStats>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_summary: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobWithAttemptsRead {
    pub job: JobRead,
    pub attempts: Vec<AttemptRead>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRead {
    pub log_lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptInfoRead {
    pub attempt: AttemptRead,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<LogRead>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfoRead {
    pub job: JobRead,
    pub attempts: Vec<AttemptInfoRead>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfoLightRead {
    pub job: JobRead,
}

/// A job that may be absent; absence is a result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptionalRead {
    pub job: Option<JobRead>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReadList {
    pub jobs: Vec<JobWithAttemptsRead>,
    pub total_job_count: u64,
}

pub fn job_read(job: &Job) -> JobRead {
    JobRead {
        id: job.id,
        config_type: job.config_type,
        config_id: job.scope.clone(),
        status: job.status,
        created_at: job.created_at,
        updated_at: job.updated_at,
        started_at: job.started_at,
        aggregated_stats: None,
        stream_aggregated_stats: None,
    }
}

pub fn attempt_read(attempt: &Attempt) -> AttemptRead {
    AttemptRead {
        id: attempt.attempt_number,
        status: attempt.status,
        created_at: attempt.created_at,
        updated_at: attempt.updated_at,
        ended_at: attempt.ended_at,
        bytes_synced: attempt.output.map(|output| output.bytes_synced),
        records_synced: attempt.output.map(|output| output.records_synced),
        total_stats: None,
        stream_stats: None,
        failure_summary: attempt.failure_summary.clone(),
    }
}

pub fn job_with_attempts_read(job: &Job) -> JobWithAttemptsRead {
    JobWithAttemptsRead {
        job: job_read(job),
        attempts: job.attempts.iter().map(attempt_read).collect(),
    }
}

pub fn attempt_info_read(attempt: &Attempt, logs: Option<LogRead>) -> AttemptInfoRead {
    AttemptInfoRead {
        attempt: attempt_read(attempt),
        logs,
    }
}

pub fn job_info_light_read(job: &Job) -> JobInfoLightRead {
    JobInfoLightRead { job: job_read(job) }
}

pub fn job_optional_read(job: Option<&Job>) -> JobOptionalRead {
    JobOptionalRead {
        job: job.map(job_read),
    }
}
