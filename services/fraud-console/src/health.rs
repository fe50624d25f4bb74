//! Backend health model and the shared health store source

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::store::{PollSource, PollingStore};

/// Overall backend health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Warning,
    Error,
    /// No probe has completed yet
    Loading,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => write!(f, "ok"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Error => write!(f, "error"),
            HealthStatus::Loading => write!(f, "loading"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// A single configuration or data problem reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub severity: IssueSeverity,
    pub field: String,
    pub message: String,
    #[serde(default)]
    pub hint: String,
}

/// Result of the latest health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    pub status: HealthStatus,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl HealthState {
    pub fn loading() -> Self {
        Self {
            status: HealthStatus::Loading,
            issues: Vec::new(),
        }
    }

    /// Synthetic state committed when the backend cannot be reached
    pub fn unreachable() -> Self {
        Self {
            status: HealthStatus::Error,
            issues: vec![Issue {
                severity: IssueSeverity::Error,
                field: "connection".to_string(),
                message: "Backend is unreachable".to_string(),
                hint: "Check that the backend server is running".to_string(),
            }],
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }
}

/// Polls `/api/health` on a fixed interval
pub struct HealthSource {
    backend: Arc<dyn Backend>,
    interval: Duration,
}

impl HealthSource {
    pub fn new(backend: Arc<dyn Backend>, interval: Duration) -> Self {
        Self { backend, interval }
    }
}

#[async_trait]
impl PollSource for HealthSource {
    type Snapshot = HealthState;

    fn name(&self) -> &str {
        "health"
    }

    fn initial(&self) -> HealthState {
        HealthState::loading()
    }

    async fn fetch(&self) -> crate::Result<HealthState> {
        self.backend.health().await
    }

    fn degrade(&self, _previous: &HealthState, _error: &crate::ConsoleError) -> HealthState {
        HealthState::unreachable()
    }

    fn next_delay(&self, _snapshot: &HealthState) -> Duration {
        self.interval
    }
}

/// The shared health store
pub type HealthStore = PollingStore<HealthSource>;
