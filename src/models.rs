// ABOUTME: Domain records read from the job store: jobs, attempts, stream statistics
// ABOUTME: The query layer only reads these; they are produced by the job execution engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{EntityKind, HistoryError, HistoryResult};
use crate::status::JobStatus;

pub type JobId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    CheckConnectionSource,
    CheckConnectionDestination,
    DiscoverSchema,
    GetSpec,
    Sync,
    ResetConnection,
    Refresh,
    Clear,
}

/// Config types that move data for a connection.
pub const SYNC_REPLICATION_TYPES: [ConfigType; 2] = [ConfigType::Sync, ConfigType::Refresh];

/// Every config type that touches a connection's destination data.
pub const REPLICATION_TYPES: [ConfigType; 4] = [
    ConfigType::Sync,
    ConfigType::ResetConnection,
    ConfigType::Refresh,
    ConfigType::Clear,
];

impl ConfigType {
    pub const ALL: [ConfigType; 8] = [
        ConfigType::CheckConnectionSource,
        ConfigType::CheckConnectionDestination,
        ConfigType::DiscoverSchema,
        ConfigType::GetSpec,
        ConfigType::Sync,
        ConfigType::ResetConnection,
        ConfigType::Refresh,
        ConfigType::Clear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::CheckConnectionSource => "check_connection_source",
            ConfigType::CheckConnectionDestination => "check_connection_destination",
            ConfigType::DiscoverSchema => "discover_schema",
            ConfigType::GetSpec => "get_spec",
            ConfigType::Sync => "sync",
            ConfigType::ResetConnection => "reset_connection",
            ConfigType::Refresh => "refresh",
            ConfigType::Clear => "clear",
        }
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigType {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigType::ALL
            .into_iter()
            .find(|config_type| config_type.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HistoryError::invalid(format!("unknown config type '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Running,
    Failed,
    Succeeded,
}

impl FromStr for AttemptStatus {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(AttemptStatus::Running),
            "failed" => Ok(AttemptStatus::Failed),
            "succeeded" => Ok(AttemptStatus::Succeeded),
            other => Err(HistoryError::UnrecognizedStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    FullRefresh,
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredStream {
    pub stream: StreamDescriptor,
    pub sync_mode: SyncMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredCatalog {
    #[serde(default)]
    pub streams: Vec<ConfiguredStream>,
}

/// The part of a job's persisted config the query layer cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobConfig {
    pub configured_catalog: Option<ConfiguredCatalog>,
}

impl JobConfig {
    /// Reads the configured catalog out of a persisted job config document.
    ///
    /// The catalog lives under the config-type specific section, e.g.
    /// `{"configType": "sync", "sync": {"configuredAirbyteCatalog": {...}}}`.
    pub fn from_json(value: &Value) -> Self {
        let configured_catalog = ["sync", "resetConnection", "refresh"]
            .iter()
            .filter_map(|section| value.get(section))
            .filter_map(|section| section.get("configuredAirbyteCatalog"))
            .find_map(|catalog| serde_json::from_value(catalog.clone()).ok());
        JobConfig { configured_catalog }
    }
}

/// Totals reported by a finished or running attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutput {
    pub bytes_synced: i64,
    pub records_synced: i64,
}

impl SyncOutput {
    /// Reads `sync.standardSyncSummary` from a persisted attempt output document.
    pub fn from_json(value: &Value) -> Option<Self> {
        let summary = value.get("sync")?.get("standardSyncSummary")?;
        Some(SyncOutput {
            bytes_synced: summary.get("bytesSynced").and_then(Value::as_i64).unwrap_or(0),
            records_synced: summary
                .get("recordsSynced")
                .and_then(Value::as_i64)
                .unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub log_path: Option<String>,
    pub output: Option<SyncOutput>,
    pub failure_summary: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub config_type: ConfigType,
    /// Owning scope, a connection id for replication jobs.
    pub scope: String,
    pub config: JobConfig,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Ordered by attempt number ascending.
    pub attempts: Vec<Attempt>,
}

impl Job {
    pub fn connection_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.scope).ok()
    }

    /// Sync mode of every configured stream, keyed by stream identity.
    pub fn streams_to_sync_mode(&self) -> HistoryResult<BTreeMap<StreamKey, SyncMode>> {
        let streams = self
            .config
            .configured_catalog
            .as_ref()
            .map(|catalog| catalog.streams.as_slice())
            .unwrap_or_default();

        let mut modes = BTreeMap::new();
        for configured in streams {
            let key = StreamKey::new(&configured.stream.name, configured.stream.namespace.as_deref());
            if modes.insert(key.clone(), configured.sync_mode).is_some() {
                return Err(HistoryError::validation(
                    EntityKind::Job,
                    self.id,
                    format!("stream {} is configured more than once", key),
                ));
            }
        }
        Ok(modes)
    }
}

/// Stream identity within a connection's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub name: String,
    pub namespace: Option<String>,
}

impl StreamKey {
    pub fn new(name: &str, namespace: Option<&str>) -> Self {
        StreamKey {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}.{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub records_emitted: i64,
    pub bytes_emitted: i64,
    pub records_committed: i64,
    pub bytes_committed: i64,
}

impl Add for SyncStats {
    type Output = SyncStats;

    fn add(mut self, rhs: SyncStats) -> SyncStats {
        self += rhs;
        self
    }
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, rhs: SyncStats) {
        self.records_emitted += rhs.records_emitted;
        self.bytes_emitted += rhs.bytes_emitted;
        self.records_committed += rhs.records_committed;
        self.bytes_committed += rhs.bytes_committed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSyncStats {
    pub stream_name: String,
    pub stream_namespace: Option<String>,
    #[serde(flatten)]
    pub stats: SyncStats,
}

impl StreamSyncStats {
    pub fn key(&self) -> StreamKey {
        StreamKey::new(&self.stream_name, self.stream_namespace.as_deref())
    }
}

/// Statistics recorded for one attempt, as stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptStats {
    pub attempt_number: i32,
    pub totals: SyncStats,
    pub streams: Vec<StreamSyncStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusSummary {
    pub job_id: JobId,
    pub connection_id: String,
    pub created_at: DateTime<Utc>,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptNormalizationStatus {
    pub attempt_number: i32,
    pub records_committed: Option<i64>,
    pub has_normalization_failed: bool,
}
