// ABOUTME: Library root for the sync job history query layer
// ABOUTME: Paginated job listings, stats hydration, sync progress and job debug info over a job store

pub mod collaborators;
pub mod config;
pub mod debug;
pub mod error;
pub mod handler;
pub mod hydrate;
pub mod logs;
pub mod models;
pub mod progress;
pub mod query;
pub mod status;
pub mod store;
pub mod views;

#[cfg(test)]
mod test_support;

pub use error::{EntityKind, HistoryError, HistoryResult};
pub use handler::{HandlerSettings, JobHistoryHandler};
