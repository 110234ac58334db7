// ABOUTME: Job status vocabulary and the mapping from the external API statuses
// ABOUTME: Defines which statuses count as still active (non-terminal)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HistoryError;

/// Status of a job as persisted by the job store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Incomplete,
    Failed,
    Succeeded,
    Cancelled,
}

/// Statuses of jobs that may still make progress.
pub const NON_TERMINAL_STATUSES: [JobStatus; 3] =
    [JobStatus::Pending, JobStatus::Running, JobStatus::Incomplete];

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Incomplete,
        JobStatus::Failed,
        JobStatus::Succeeded,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Incomplete => "incomplete",
            JobStatus::Failed => "failed",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !NON_TERMINAL_STATUSES.contains(self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| HistoryError::UnrecognizedStatus(s.to_string()))
    }
}

/// Status tokens accepted from API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiJobStatus {
    Pending,
    Running,
    Incomplete,
    Failed,
    Succeeded,
    Cancelled,
}

impl ApiJobStatus {
    const TOKENS: [(&'static str, ApiJobStatus); 6] = [
        ("pending", ApiJobStatus::Pending),
        ("running", ApiJobStatus::Running),
        ("incomplete", ApiJobStatus::Incomplete),
        ("failed", ApiJobStatus::Failed),
        ("succeeded", ApiJobStatus::Succeeded),
        ("cancelled", ApiJobStatus::Cancelled),
    ];
}

impl FromStr for ApiJobStatus {
    type Err = HistoryError;

    /// Case-insensitive exact-name match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApiJobStatus::TOKENS
            .iter()
            .find(|(token, _)| token.eq_ignore_ascii_case(s))
            .map(|(_, status)| *status)
            .ok_or_else(|| HistoryError::UnrecognizedStatus(s.to_string()))
    }
}

impl From<ApiJobStatus> for JobStatus {
    fn from(status: ApiJobStatus) -> Self {
        match status {
            ApiJobStatus::Pending => JobStatus::Pending,
            ApiJobStatus::Running => JobStatus::Running,
            ApiJobStatus::Incomplete => JobStatus::Incomplete,
            ApiJobStatus::Failed => JobStatus::Failed,
            ApiJobStatus::Succeeded => JobStatus::Succeeded,
            ApiJobStatus::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// Maps API status tokens to job statuses, failing on the first unknown token.
pub fn map_to_domain_statuses<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<JobStatus>, HistoryError> {
    tokens
        .iter()
        .map(|token| token.as_ref().parse::<ApiJobStatus>().map(JobStatus::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_terminal_set() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Incomplete.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_api_status_matches_case_insensitively() {
        assert_eq!("RUNNING".parse::<ApiJobStatus>().unwrap(), ApiJobStatus::Running);
        assert_eq!("Cancelled".parse::<ApiJobStatus>().unwrap(), ApiJobStatus::Cancelled);
    }

    #[test]
    fn test_api_status_rejects_partial_names() {
        let err = "run".parse::<ApiJobStatus>().unwrap_err();
        assert!(matches!(err, HistoryError::UnrecognizedStatus(token) if token == "run"));
        assert!(" running".parse::<ApiJobStatus>().is_err());
    }

    #[test]
    fn test_map_to_domain_statuses() {
        let statuses = map_to_domain_statuses(&["failed", "INCOMPLETE"]).unwrap();
        assert_eq!(statuses, vec![JobStatus::Failed, JobStatus::Incomplete]);

        let err = map_to_domain_statuses(&["succeeded", "queued"]).unwrap_err();
        assert!(matches!(err, HistoryError::UnrecognizedStatus(token) if token == "queued"));
    }

    #[test]
    fn test_every_api_status_has_a_domain_status() {
        for (token, api) in ApiJobStatus::TOKENS {
            assert_eq!(JobStatus::from(api).as_str(), token);
        }
    }
}
