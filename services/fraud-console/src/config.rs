//! Configuration types for the fraud console service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Where the fraud-checker backend lives and how requests are retried
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl BackendConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Poll cadences of the shared job and health stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_job_running_interval")]
    pub job_running_interval_ms: u64,
    #[serde(default = "default_job_idle_interval")]
    pub job_idle_interval_ms: u64,
    #[serde(default = "default_health_interval")]
    pub health_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            job_running_interval_ms: default_job_running_interval(),
            job_idle_interval_ms: default_job_idle_interval(),
            health_interval_ms: default_health_interval(),
        }
    }
}

impl PollingConfig {
    pub fn job_running_interval(&self) -> Duration {
        Duration::from_millis(self.job_running_interval_ms)
    }

    pub fn job_idle_interval(&self) -> Duration {
        Duration::from_millis(self.job_idle_interval_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

/// Job runner timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_runner_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            poll_interval_ms: default_runner_poll_interval(),
        }
    }
}

impl RunnerConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Notification center limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notice_duration")]
    pub default_duration_ms: u64,
    #[serde(default = "default_notice_capacity")]
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: default_notice_duration(),
            capacity: default_notice_capacity(),
        }
    }
}

impl NotificationConfig {
    pub fn default_duration(&self) -> Duration {
        Duration::from_millis(self.default_duration_ms)
    }
}

/// Bulk export sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_rows: default_max_rows(),
            output_dir: default_output_dir(),
        }
    }
}

/// Operator API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dashboard_port")]
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_dashboard_port(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    500
}

fn default_job_running_interval() -> u64 {
    2000
}

fn default_job_idle_interval() -> u64 {
    10000
}

fn default_health_interval() -> u64 {
    30000
}

fn default_settle_delay() -> u64 {
    500
}

fn default_runner_poll_interval() -> u64 {
    2000
}

fn default_notice_duration() -> u64 {
    6000
}

fn default_notice_capacity() -> usize {
    5
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_rows() -> usize {
    10000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_dashboard_port() -> u16 {
    11120
}

impl Config {
    /// Reject values that would make the pollers or the exporter spin
    pub fn validate(&self) -> crate::Result<()> {
        if self.export.batch_size == 0 {
            return Err(crate::ConsoleError::Config(
                "export.batch_size must be greater than zero".to_string(),
            ));
        }
        if self.notifications.capacity == 0 {
            return Err(crate::ConsoleError::Config(
                "notifications.capacity must be greater than zero".to_string(),
            ));
        }
        if self.polling.job_running_interval_ms == 0
            || self.polling.job_idle_interval_ms == 0
            || self.polling.health_interval_ms == 0
            || self.runner.poll_interval_ms == 0
        {
            return Err(crate::ConsoleError::Config(
                "polling intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::ConsoleError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
