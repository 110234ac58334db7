// ABOUTME: Error types for the job history query layer
// ABOUTME: Every collaborator failure is translated into one of these kinds before it leaves the crate

use std::fmt;
use thiserror::Error;

/// Entities the query layer can fail to find or validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Job,
    Connection,
    Source,
    Destination,
    SourceDefinition,
    DestinationDefinition,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            EntityKind::Job => "job",
            EntityKind::Connection => "connection",
            EntityKind::Source => "source",
            EntityKind::Destination => "destination",
            EntityKind::SourceDefinition => "source definition",
            EntityKind::DestinationDefinition => "destination definition",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unrecognized job status: {0}")]
    UnrecognizedStatus(String),
    #[error("Not found: {entity} {id}")]
    NotFound { entity: EntityKind, id: String },
    #[error("Validation error for {entity} {id}: {message}")]
    Validation {
        entity: EntityKind,
        id: String,
        message: String,
    },
    #[error("Storage or collaborator unavailable: {0}")]
    TransientIo(String),
}

impl HistoryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        HistoryError::InvalidArgument(message.into())
    }

    pub fn not_found(entity: EntityKind, id: impl fmt::Display) -> Self {
        HistoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(entity: EntityKind, id: impl fmt::Display, message: impl Into<String>) -> Self {
        HistoryError::Validation {
            entity,
            id: id.to_string(),
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        HistoryError::TransientIo(message.into())
    }

    /// True for the kinds a caller should treat as a bad request.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            HistoryError::InvalidArgument(_) | HistoryError::UnrecognizedStatus(_)
        )
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;

impl From<tokio_postgres::Error> for HistoryError {
    fn from(err: tokio_postgres::Error) -> Self {
        HistoryError::transient(format!("database query failed: {}", err))
    }
}
