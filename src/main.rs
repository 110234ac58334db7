// ABOUTME: Command-line entry point for querying sync job history
// ABOUTME: Each subcommand runs one history operation and prints the result as JSON

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use sync_job_history::collaborators::{PgConfigLookup, WorkflowClient};
use sync_job_history::config::{Config, DEFAULT_CONFIG_PATH};
use sync_job_history::models::{ConfigType, JobId};
use sync_job_history::query::{JobListForWorkspacesRequest, JobListRequest, Pagination};
use sync_job_history::store::{postgres::connect, PgJobStore};
use sync_job_history::JobHistoryHandler;

#[derive(Parser)]
#[command(name = "job-history")]
#[command(about = "Query sync job history: listings, progress and debug info", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ListFilters {
    /// Config types to include (sync, reset_connection, refresh, clear, ...)
    #[arg(long = "config-type", required = true, num_args = 1..)]
    config_types: Vec<ConfigType>,
    /// Status tokens to include (pending, running, incomplete, failed, succeeded, cancelled)
    #[arg(long = "status")]
    statuses: Vec<String>,
    #[arg(long)]
    created_after: Option<DateTime<Utc>>,
    #[arg(long)]
    created_before: Option<DateTime<Utc>>,
    #[arg(long)]
    updated_after: Option<DateTime<Utc>>,
    #[arg(long)]
    updated_before: Option<DateTime<Utc>>,
    #[arg(long)]
    page_size: Option<u32>,
    #[arg(long)]
    row_offset: Option<u32>,
    /// createdAt or updatedAt
    #[arg(long)]
    order_by: Option<String>,
    /// ASC or DESC
    #[arg(long)]
    order: Option<String>,
}

impl ListFilters {
    fn statuses(&self) -> Option<Vec<String>> {
        (!self.statuses.is_empty()).then(|| self.statuses.clone())
    }

    fn pagination(&self) -> Option<Pagination> {
        (self.page_size.is_some() || self.row_offset.is_some()).then_some(Pagination {
            page_size: self.page_size,
            row_offset: self.row_offset,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List jobs of one connection (or all jobs without --config-id)
    List {
        #[arg(long)]
        config_id: Option<String>,
        /// Return the smallest page that contains this job
        #[arg(long)]
        including_job_id: Option<JobId>,
        #[command(flatten)]
        filters: ListFilters,
    },
    /// List jobs across the connections of workspaces
    ListWorkspaces {
        #[arg(long = "workspace-id", required = true, num_args = 1..)]
        workspace_ids: Vec<Uuid>,
        #[command(flatten)]
        filters: ListFilters,
    },
    /// Job with attempts and log tails
    Info {
        job_id: JobId,
        /// Omit logs and include aggregated statistics
        #[arg(long)]
        without_logs: bool,
    },
    /// Job projection without attempts
    InfoLight { job_id: JobId },
    /// Job together with its connection, source, destination and definitions
    Debug { job_id: JobId },
    /// Most recent replication job of a connection
    LastReplication { connection_id: Uuid },
    /// Most recent sync job of a connection that has not finished
    LatestRunning { connection_id: Uuid },
    /// Most recent sync job of a connection
    LatestSync { connection_id: Uuid },
    /// Per-stream progress of the running sync of a connection
    Progress { connection_id: Uuid },
    /// Latest sync job status of each connection
    LatestSyncs {
        #[arg(required = true)]
        connection_ids: Vec<Uuid>,
    },
    /// Unfinished sync jobs of the connections
    RunningSyncs {
        #[arg(required = true)]
        connection_ids: Vec<Uuid>,
    },
    /// Normalization outcome of each attempt of a job
    Normalization { job_id: JobId },
    /// Sync mode of every stream configured for a job
    SyncModes { job_id: JobId },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn build_handler(config: &Config) -> Result<JobHistoryHandler> {
    let jobs_url = config.database_url()?;
    let store = PgJobStore::connect(jobs_url)
        .await
        .context("Failed to connect to the jobs database")?;
    let config_client = connect(config.config_database_url()?)
        .await
        .context("Failed to connect to the config database")?;

    let mut handler = JobHistoryHandler::new(
        Arc::new(store),
        Arc::new(PgConfigLookup::new(config_client)),
        config.handler_settings(),
    );
    if let Some(workflow) = &config.workflow {
        let client = WorkflowClient::new(workflow.api_base_url.clone(), workflow.timeout())
            .context("Failed to build workflow API client")?;
        handler = handler.with_workflows(Arc::new(client));
    }
    Ok(handler)
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries JSON results; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let handler = build_handler(&config).await?;

    match cli.command {
        Commands::List {
            config_id,
            including_job_id,
            filters,
        } => {
            let request = JobListRequest {
                config_types: filters.config_types.clone(),
                config_id,
                statuses: filters.statuses(),
                created_at_start: filters.created_after,
                created_at_end: filters.created_before,
                updated_at_start: filters.updated_after,
                updated_at_end: filters.updated_before,
                pagination: filters.pagination(),
                including_job_id,
                order_by_field: filters.order_by.clone(),
                order_by_method: filters.order.clone(),
            };
            print_json(&handler.list_jobs_for(&request).await?)
        }
        Commands::ListWorkspaces {
            workspace_ids,
            filters,
        } => {
            let request = JobListForWorkspacesRequest {
                config_types: filters.config_types.clone(),
                workspace_ids,
                statuses: filters.statuses(),
                created_at_start: filters.created_after,
                created_at_end: filters.created_before,
                updated_at_start: filters.updated_after,
                updated_at_end: filters.updated_before,
                pagination: filters.pagination(),
                order_by_field: filters.order_by.clone(),
                order_by_method: filters.order.clone(),
            };
            print_json(&handler.list_jobs_for_workspaces(&request).await?)
        }
        Commands::Info {
            job_id,
            without_logs,
        } => {
            let info = if without_logs {
                handler.get_job_info_without_logs(job_id).await?
            } else {
                handler.get_job_info(job_id).await?
            };
            print_json(&info)
        }
        Commands::InfoLight { job_id } => print_json(&handler.get_job_info_light(job_id).await?),
        Commands::Debug { job_id } => print_json(&handler.get_job_debug_info(job_id).await?),
        Commands::LastReplication { connection_id } => {
            print_json(&handler.get_last_replication_job(connection_id).await?)
        }
        Commands::LatestRunning { connection_id } => {
            print_json(&handler.get_latest_running_sync_job(connection_id).await?)
        }
        Commands::LatestSync { connection_id } => {
            print_json(&handler.get_latest_sync_job(connection_id).await?)
        }
        Commands::Progress { connection_id } => {
            print_json(&handler.get_connection_sync_progress(connection_id).await?)
        }
        Commands::LatestSyncs { connection_ids } => print_json(
            &handler
                .get_latest_sync_jobs_for_connections(&connection_ids)
                .await?,
        ),
        Commands::RunningSyncs { connection_ids } => print_json(
            &handler
                .get_running_sync_jobs_for_connections(&connection_ids)
                .await?,
        ),
        Commands::Normalization { job_id } => {
            print_json(&handler.get_attempt_normalization_statuses(job_id).await?)
        }
        Commands::SyncModes { job_id } => print_json(&handler.streams_to_sync_mode(job_id).await?),
    }
}
