//! Backend job model and the shared job-status store source

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::backend::Backend;
use crate::config::PollingConfig;
use crate::store::{PollSource, PollingStore};

/// Lifecycle status of the single backend job slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Idle => write!(f, "idle"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Latest known state of the backend job, as reported by `/api/job/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
}

impl JobState {
    /// The state reported before any job has ever run
    pub fn idle() -> Self {
        Self {
            status: JobStatus::Idle,
            job_id: None,
            message: None,
            started_at: None,
            completed_at: None,
            result: None,
        }
    }
}

/// The backend emits either RFC 3339 or naive ISO timestamps; naive ones are UTC
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

/// Snapshot held by the job-status store
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobSnapshot {
    /// `None` until the first successful poll
    pub job: Option<JobState>,
    /// The most recent poll failed; `job` is the last known value
    pub error: bool,
}

/// A backend job the operator can trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    IngestClicks {
        date: String,
    },
    IngestConversions {
        date: String,
    },
    Refresh {
        #[serde(default = "default_refresh_hours")]
        hours: u32,
        #[serde(default = "default_true")]
        clicks: bool,
        #[serde(default = "default_true")]
        conversions: bool,
        #[serde(default)]
        detect: bool,
    },
    SyncMasters,
}

fn default_refresh_hours() -> u32 {
    24
}

fn default_true() -> bool {
    true
}

impl JobKind {
    /// Identity the backend assigns to a job of this kind
    pub fn job_id(&self) -> String {
        match self {
            JobKind::IngestClicks { date } => format!("ingest_clicks_{}", date),
            JobKind::IngestConversions { date } => format!("ingest_conversions_{}", date),
            JobKind::Refresh { hours, .. } => format!("refresh_{}h", hours),
            JobKind::SyncMasters => "sync_masters".to_string(),
        }
    }

    pub fn start_message(&self) -> String {
        match self {
            JobKind::IngestClicks { date } => format!("Ingesting click logs for {}...", date),
            JobKind::IngestConversions { date } => {
                format!("Ingesting conversion logs for {}...", date)
            }
            JobKind::Refresh { hours, .. } => {
                format!("Refreshing data for the last {} hours...", hours)
            }
            JobKind::SyncMasters => "Synchronizing master data...".to_string(),
        }
    }
}

/// Polls `/api/job/status` for the shared job-status store
pub struct JobStatusSource {
    backend: Arc<dyn Backend>,
    running_interval: Duration,
    idle_interval: Duration,
}

impl JobStatusSource {
    pub fn new(backend: Arc<dyn Backend>, config: &PollingConfig) -> Self {
        Self {
            backend,
            running_interval: config.job_running_interval(),
            idle_interval: config.job_idle_interval(),
        }
    }
}

#[async_trait]
impl PollSource for JobStatusSource {
    type Snapshot = JobSnapshot;

    fn name(&self) -> &str {
        "job-status"
    }

    fn initial(&self) -> JobSnapshot {
        JobSnapshot::default()
    }

    async fn fetch(&self) -> crate::Result<JobSnapshot> {
        let job = self.backend.job_status().await?;
        Ok(JobSnapshot {
            job: Some(job),
            error: false,
        })
    }

    fn degrade(&self, previous: &JobSnapshot, _error: &crate::ConsoleError) -> JobSnapshot {
        JobSnapshot {
            job: previous.job.clone(),
            error: true,
        }
    }

    fn next_delay(&self, snapshot: &JobSnapshot) -> Duration {
        match snapshot.job.as_ref().map(|j| j.status) {
            Some(JobStatus::Running) => self.running_interval,
            _ => self.idle_interval,
        }
    }
}

/// The shared job-status store
pub type JobStatusStore = PollingStore<JobStatusSource>;
