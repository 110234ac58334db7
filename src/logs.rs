// ABOUTME: Reads the tail of an attempt's log file for job info views
// ABOUTME: A log that was never written or has been cleaned up reads as empty

use std::io::ErrorKind;

use crate::error::{HistoryError, HistoryResult};
use crate::views::LogRead;

#[derive(Debug, Clone, Copy)]
pub struct LogReader {
    tail_lines: usize,
}

impl LogReader {
    pub fn new(tail_lines: usize) -> Self {
        Self { tail_lines }
    }

    pub async fn read(&self, log_path: Option<&str>) -> HistoryResult<LogRead> {
        let Some(path) = log_path else {
            return Ok(LogRead::default());
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path, "Attempt log file does not exist");
                return Ok(LogRead::default());
            }
            Err(e) => {
                return Err(HistoryError::transient(format!(
                    "failed to read log file {}: {}",
                    path, e
                )))
            }
        };

        let lines: Vec<&str> = contents.lines().collect();
        let skip = lines.len().saturating_sub(self.tail_lines);
        Ok(LogRead {
            log_lines: lines[skip..].iter().map(|line| line.to_string()).collect(),
        })
    }
}
