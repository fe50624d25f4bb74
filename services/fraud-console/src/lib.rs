//! Fraud Console - job monitoring and bulk export for the fraud-checker backend
//!
//! Follows backend ingestion and sync jobs through adaptive polling, turns
//! job resolutions into operator notices, and exports suspicious-activity
//! lists to CSV in bounded batches.

pub mod backend;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod health;
pub mod io;
pub mod job;
pub mod notice;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod suspicious;
pub mod transition;

pub use config::{load_config, Config};
pub use error::{ConsoleError, Result};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, HttpBackend};
use crate::export::{
    failure_notice, CapConfirmation, ExportEngine, ExportOutcome, ExportProgress, ExportStart,
};
use crate::health::{HealthSource, HealthStore};
use crate::io::{HttpClient, ReqwestHttpClient};
use crate::job::{JobStatusSource, JobStatusStore};
use crate::notice::NotificationCenter;
use crate::runner::JobRunner;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::store::Subscription;
use crate::suspicious::{SuspiciousKind, SuspiciousPages};
use crate::transition::JobTransitionNotifier;

/// Builder for the console service.
///
/// Uses the reqwest-backed HTTP client and the tokio scheduler unless
/// replaced.
pub struct ConsoleBuilder {
    config: Config,
    http: Option<Arc<dyn HttpClient>>,
    backend: Option<Arc<dyn Backend>>,
    scheduler: Arc<dyn Scheduler>,
}

impl ConsoleBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: None,
            backend: None,
            scheduler: Arc::new(TokioScheduler),
        }
    }

    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Bypass HTTP entirely
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn build(self) -> Result<Console> {
        self.config.validate()?;
        let backend = match self.backend {
            Some(backend) => backend,
            None => {
                let http = self
                    .http
                    .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
                Arc::new(HttpBackend::new(&self.config.backend, http))
            }
        };
        let scheduler = self.scheduler;

        let notices = NotificationCenter::new(&self.config.notifications, Arc::clone(&scheduler));
        let job_store = JobStatusStore::new(
            JobStatusSource::new(Arc::clone(&backend), &self.config.polling),
            Arc::clone(&scheduler),
        );
        let health_store = HealthStore::new(
            HealthSource::new(Arc::clone(&backend), self.config.polling.health_interval()),
            Arc::clone(&scheduler),
        );
        let runner = JobRunner::new(
            Arc::clone(&backend),
            Arc::clone(&scheduler),
            &self.config.runner,
        );
        let transitions = Arc::new(JobTransitionNotifier::new(notices.clone()));
        let (export_progress, _) = watch::channel(None);

        tracing::info!("Backend: {}", self.config.backend.base_url);
        Ok(Console {
            inner: Arc::new(ConsoleInner {
                config: self.config,
                backend,
                notices,
                job_store,
                health_store,
                runner,
                transitions,
                export_progress,
                exporting: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        })
    }
}

struct ConsoleInner {
    config: Config,
    backend: Arc<dyn Backend>,
    notices: NotificationCenter,
    job_store: JobStatusStore,
    health_store: HealthStore,
    runner: JobRunner,
    transitions: Arc<JobTransitionNotifier>,
    export_progress: watch::Sender<Option<ExportProgress>>,
    exporting: AtomicBool,
    shutdown: CancellationToken,
}

/// Held for the lifetime of one export; releases the slot on drop
struct ExportSlot<'a>(&'a AtomicBool);

impl<'a> ExportSlot<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for ExportSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The assembled console. Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct Console {
    inner: Arc<ConsoleInner>,
}

/// Result of an export request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportReport {
    NeedsConfirmation {
        total: usize,
        cap: usize,
        message: String,
    },
    Empty,
    Cancelled,
    /// Another export holds the slot; nothing was fetched
    Busy,
    Written {
        path: PathBuf,
        rows: usize,
        total: usize,
        truncated: bool,
    },
}

impl From<CapConfirmation> for ExportReport {
    fn from(confirmation: CapConfirmation) -> Self {
        ExportReport::NeedsConfirmation {
            total: confirmation.total,
            cap: confirmation.cap,
            message: confirmation.message(),
        }
    }
}

/// Observers that keep both stores polling while held
#[must_use = "polling stops when the observers are dropped"]
#[derive(Debug)]
pub struct ConsoleObservers {
    _job: Subscription,
    _health: Subscription,
}

impl Console {
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn notices(&self) -> &NotificationCenter {
        &self.inner.notices
    }

    pub fn job_store(&self) -> &JobStatusStore {
        &self.inner.job_store
    }

    pub fn health_store(&self) -> &HealthStore {
        &self.inner.health_store
    }

    pub fn runner(&self) -> &JobRunner {
        &self.inner.runner
    }

    pub fn export_progress(&self) -> Option<ExportProgress> {
        *self.inner.export_progress.borrow()
    }

    /// Token cancelled when the service shuts down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Subscribe to both stores, feeding job snapshots to the transition notifier
    pub fn observe(&self) -> ConsoleObservers {
        ConsoleObservers {
            _job: self.inner.transitions.attach(&self.inner.job_store),
            _health: self.inner.health_store.subscribe(|health| {
                tracing::debug!("Backend health: {}", health.status);
            }),
        }
    }

    /// Export one suspicious-activity list to the configured output directory.
    ///
    /// Totals above the row cap come back as `NeedsConfirmation` unless
    /// `confirm` is set. Only one export runs at a time; a second request
    /// returns `Busy` and leaves the running export's progress alone.
    /// Failures also publish a persistent notice.
    pub async fn export(
        &self,
        kind: SuspiciousKind,
        date: Option<String>,
        search: Option<String>,
        confirm: bool,
    ) -> Result<ExportReport> {
        let Some(_slot) = ExportSlot::acquire(&self.inner.exporting) else {
            tracing::info!("Export of {:?} refused, another export is running", kind);
            return Ok(ExportReport::Busy);
        };
        let pages = SuspiciousPages::new(Arc::clone(&self.inner.backend), kind, date, search);
        let result = self.run_export(&pages, confirm).await;
        self.inner.export_progress.send_replace(None);
        if let Err(e) = &result {
            tracing::warn!("Export of {:?} failed: {}", kind, e);
            self.inner.notices.notify(failure_notice(e));
        }
        result
    }

    async fn run_export(&self, pages: &SuspiciousPages, confirm: bool) -> Result<ExportReport> {
        let engine = ExportEngine::from_config(&self.inner.config.export);
        let total = pages.total().await?;
        let job = match engine.start(total) {
            ExportStart::Empty => {
                for notice in ExportOutcome::Empty.notices() {
                    self.inner.notices.notify(notice);
                }
                return Ok(ExportReport::Empty);
            }
            ExportStart::NeedsConfirmation(confirmation) if !confirm => {
                tracing::info!("{}", confirmation.message());
                return Ok(confirmation.into());
            }
            ExportStart::NeedsConfirmation(confirmation) => confirmation.confirm(),
            ExportStart::Ready(job) => job,
        };

        let progress = self.inner.export_progress.clone();
        let cancel = self.inner.shutdown.child_token();
        let outcome = job
            .run(
                pages,
                pages.file_name(),
                move |p| {
                    tracing::debug!("Export progress {}/{} ({:?})", p.current, p.total, p.stage);
                    progress.send_replace(Some(p));
                },
                &cancel,
            )
            .await?;

        let report = match &outcome {
            ExportOutcome::Empty => ExportReport::Empty,
            ExportOutcome::Cancelled => ExportReport::Cancelled,
            ExportOutcome::Written {
                artifact,
                rows,
                total,
            } => ExportReport::Written {
                path: artifact.save_to(&self.inner.config.export.output_dir).await?,
                rows: *rows,
                total: *total,
                truncated: outcome.is_truncated(),
            },
        };
        for notice in outcome.notices() {
            self.inner.notices.notify(notice);
        }
        Ok(report)
    }

    /// Serve the operator API until ctrl-c
    pub async fn start(self) -> Result<()> {
        let cancel = self.shutdown_token();
        let cancel_for_signal = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => tracing::error!("Failed to listen for ctrl-c: {}", e),
            }
            cancel_for_signal.cancel();
        });

        let observers = self.observe();
        tracing::info!("Fraud console started");

        if self.inner.config.dashboard.enabled {
            let port = self.inner.config.dashboard.port;
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                ConsoleError::Dashboard(format!("Failed to bind port {}: {}", port, e))
            })?;
            tracing::info!("Dashboard listening on http://{}", addr);

            let router = dashboard::build_router(self.clone());
            let cancel_for_dashboard = cancel.clone();
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    cancel_for_dashboard.cancelled().await;
                })
                .await
                .map_err(|e| ConsoleError::Dashboard(e.to_string()))?;
            tracing::debug!("Dashboard stopped");
        } else {
            cancel.cancelled().await;
        }

        drop(observers);
        self.inner.runner.reset();
        tracing::info!("Fraud console stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("backend", &self.inner.config.backend.base_url)
            .finish()
    }
}
