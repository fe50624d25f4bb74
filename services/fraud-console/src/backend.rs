//! Client for the fraud-checker backend API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::health::HealthState;
use crate::io::{HttpClient, HttpResponse};
use crate::job::{JobKind, JobState};
use crate::suspicious::{SuspiciousKind, SuspiciousPage};

/// Filters and paging for the suspicious-activity list endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub date: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub search: Option<String>,
}

impl ListQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(4);
        if let Some(date) = self.date.as_deref().filter(|d| !d.is_empty()) {
            params.push(("date", date.to_string()));
        }
        params.push(("limit", self.limit.to_string()));
        params.push(("offset", self.offset.to_string()));
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            params.push(("search", search.to_string()));
        }
        params
    }
}

/// Reply to a job trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Operations the console needs from the backend
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait Backend: Send + Sync {
    /// Current state of the backend job slot. No side effects.
    async fn job_status(&self) -> crate::Result<JobState>;

    async fn health(&self) -> crate::Result<HealthState>;

    /// One page of suspicious clicks or conversions
    async fn list_suspicious(
        &self,
        kind: SuspiciousKind,
        query: &ListQuery,
    ) -> crate::Result<SuspiciousPage>;

    /// Ask the backend to start a job. Returns once the backend has accepted it.
    async fn start_job(&self, kind: &JobKind) -> crate::Result<TriggerResponse>;
}

/// [`Backend`] over HTTP with retry on transient failures
pub struct HttpBackend {
    base_url: String,
    retries: u32,
    retry_delay: Duration,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("retries", &self.retries)
            .finish()
    }
}

impl HttpBackend {
    pub fn new(config: &BackendConfig, http: Arc<dyn HttpClient>) -> Self {
        tracing::debug!("Created HttpBackend for {}", config.base_url);
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retries: config.retries,
            retry_delay: config.retry_delay(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET with linear backoff on transport errors, 408, 429 and 5xx
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> crate::Result<T> {
        let mut attempt = 0;
        loop {
            let error = match self.http.get(url).await {
                Ok(response) if response.is_success() => {
                    return Ok(serde_json::from_str(&response.body)?);
                }
                Ok(response) => {
                    let retryable = is_retryable(response.status);
                    let error = api_error(&response);
                    if !retryable {
                        return Err(error);
                    }
                    error
                }
                Err(e) => e,
            };

            if attempt >= self.retries {
                return Err(error);
            }
            attempt += 1;
            tracing::debug!(
                "GET {} failed ({}), retry {}/{}",
                url,
                error,
                attempt,
                self.retries
            );
            tokio::time::sleep(self.retry_delay * attempt).await;
        }
    }

    /// Triggers are not idempotent, so they are sent exactly once
    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> crate::Result<T> {
        let response = self.http.post_json(url, body).await?;
        if !response.is_success() {
            return Err(api_error(&response));
        }
        Ok(serde_json::from_str(&response.body)?)
    }
}

fn is_retryable(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

/// Pull a human-readable reason out of an error reply.
///
/// The backend answers with `{"detail": ...}`; other proxies use
/// `{"message": ...}` or a bare JSON string.
fn api_error(response: &HttpResponse) -> crate::ConsoleError {
    let detail = match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(payload) => match (payload.get("detail"), payload.get("message")) {
            (Some(serde_json::Value::String(s)), _) => s.clone(),
            (Some(detail), _) if !detail.is_null() => detail.to_string(),
            (_, Some(serde_json::Value::String(s))) => s.clone(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    };
    let detail = if detail.is_empty() {
        format!("Request failed ({})", response.status)
    } else {
        detail
    };
    crate::ConsoleError::Api {
        status: Some(response.status),
        detail,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn job_status(&self) -> crate::Result<JobState> {
        self.get_json(&self.url("/api/job/status")).await
    }

    async fn health(&self) -> crate::Result<HealthState> {
        self.get_json(&self.url("/api/health")).await
    }

    async fn list_suspicious(
        &self,
        kind: SuspiciousKind,
        query: &ListQuery,
    ) -> crate::Result<SuspiciousPage> {
        let url = reqwest::Url::parse_with_params(&self.url(kind.path()), query.params())
            .map_err(|e| crate::ConsoleError::Config(format!("Invalid backend URL: {}", e)))?;
        self.get_json(url.as_str()).await
    }

    async fn start_job(&self, kind: &JobKind) -> crate::Result<TriggerResponse> {
        let (path, body) = match kind {
            JobKind::IngestClicks { date } => {
                ("/api/ingest/clicks", serde_json::json!({ "date": date }))
            }
            JobKind::IngestConversions { date } => {
                ("/api/ingest/conversions", serde_json::json!({ "date": date }))
            }
            JobKind::Refresh {
                hours,
                clicks,
                conversions,
                detect,
            } => (
                "/api/refresh",
                serde_json::json!({
                    "hours": hours,
                    "clicks": clicks,
                    "conversions": conversions,
                    "detect": detect,
                }),
            ),
            JobKind::SyncMasters => ("/api/sync/masters", serde_json::json!({})),
        };
        tracing::info!("Triggering job '{}'", kind.job_id());
        self.post_json(&self.url(path), &body).await
    }
}
