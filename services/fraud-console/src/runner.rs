//! Per-invocation job runner
//!
//! The runner starts one backend job and then follows it with its own poll
//! loop until the backend reports a terminal status. It is independent of
//! the shared job-status store so it tracks exactly the job it triggered and
//! stops deterministically once that job resolves.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::backend::Backend;
use crate::config::RunnerConfig;
use crate::job::{JobKind, JobStatus};
use crate::scheduler::{Scheduler, TimerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    Idle,
    Running,
    Success,
    Error,
}

/// What the runner exposes to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerView {
    pub status: RunnerStatus,
    pub message: String,
    pub job_id: Option<String>,
    pub result: Option<serde_json::Map<String, serde_json::Value>>,
    /// True while the start call or the poll loop is in flight
    pub loading: bool,
}

impl RunnerView {
    pub fn idle() -> Self {
        Self {
            status: RunnerStatus::Idle,
            message: String::new(),
            job_id: None,
            result: None,
            loading: false,
        }
    }
}

pub type SuccessHook = Arc<dyn Fn(&RunnerView) + Send + Sync>;

#[derive(Default)]
struct Control {
    /// Bumped on every run and reset; stale loops compare against it and bail
    epoch: u64,
    timer: Option<TimerHandle>,
}

struct Inner {
    backend: Arc<dyn Backend>,
    scheduler: Arc<dyn Scheduler>,
    settle_delay: Duration,
    poll_interval: Duration,
    view: watch::Sender<RunnerView>,
    control: Mutex<Control>,
    on_success: Option<SuccessHook>,
}

/// Runs one job at a time and follows it to completion
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

impl JobRunner {
    pub fn new(
        backend: Arc<dyn Backend>,
        scheduler: Arc<dyn Scheduler>,
        config: &RunnerConfig,
    ) -> Self {
        Self::build(backend, scheduler, config, None)
    }

    /// Like [`new`](Self::new), invoking `hook` whenever a job completes successfully
    pub fn with_success_hook(
        backend: Arc<dyn Backend>,
        scheduler: Arc<dyn Scheduler>,
        config: &RunnerConfig,
        hook: SuccessHook,
    ) -> Self {
        Self::build(backend, scheduler, config, Some(hook))
    }

    fn build(
        backend: Arc<dyn Backend>,
        scheduler: Arc<dyn Scheduler>,
        config: &RunnerConfig,
        on_success: Option<SuccessHook>,
    ) -> Self {
        let (view, _) = watch::channel(RunnerView::idle());
        Self {
            inner: Arc::new(Inner {
                backend,
                scheduler,
                settle_delay: config.settle_delay(),
                poll_interval: config.poll_interval(),
                view,
                control: Mutex::new(Control::default()),
                on_success,
            }),
        }
    }

    pub fn view(&self) -> RunnerView {
        self.inner.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<RunnerView> {
        self.inner.view.subscribe()
    }

    /// Start a job and follow it.
    ///
    /// Returns `false` without touching any state if a job is already running.
    /// A failing `start` moves straight to `Error` and no polling happens.
    pub async fn run_job<T, Fut>(
        &self,
        job_id: impl Into<String>,
        start_message: impl Into<String>,
        start: Fut,
    ) -> bool
    where
        Fut: Future<Output = crate::Result<T>> + Send,
    {
        let epoch = {
            let mut control = self.inner.control();
            if self.inner.view.borrow().status == RunnerStatus::Running {
                tracing::debug!("Job runner busy, ignoring trigger");
                return false;
            }
            control.epoch += 1;
            if let Some(timer) = control.timer.take() {
                self.inner.scheduler.cancel(&timer);
            }
            let job_id = job_id.into();
            tracing::info!("Starting job '{}'", job_id);
            self.inner.view.send_replace(RunnerView {
                status: RunnerStatus::Running,
                message: start_message.into(),
                job_id: Some(job_id),
                result: None,
                loading: true,
            });
            control.epoch
        };

        match start.await {
            Ok(_) => {
                let mut control = self.inner.control();
                if control.epoch == epoch {
                    let timer = self.inner.schedule_poll(self.inner.settle_delay, epoch);
                    control.timer = Some(timer);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to start job: {}", e);
                let message = e.user_message("Failed to start job");
                self.inner.update_if_current(epoch, |view| {
                    view.status = RunnerStatus::Error;
                    view.message = message;
                    view.loading = false;
                });
            }
        }
        true
    }

    /// Trigger one of the backend's job kinds
    pub async fn run_kind(&self, kind: &JobKind) -> bool {
        let backend = Arc::clone(&self.inner.backend);
        self.run_job(kind.job_id(), kind.start_message(), async move {
            backend.start_job(kind).await
        })
        .await
    }

    /// Cancel any pending poll and return to `Idle`. Safe in every state.
    pub fn reset(&self) {
        let mut control = self.inner.control();
        control.epoch += 1;
        if let Some(timer) = control.timer.take() {
            self.inner.scheduler.cancel(&timer);
        }
        self.inner.view.send_replace(RunnerView::idle());
        tracing::debug!("Job runner reset");
    }

    /// Whether a follow-up poll is armed and has not fired yet
    pub fn has_pending_poll(&self) -> bool {
        self.inner
            .control()
            .timer
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }
}

impl Inner {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn schedule_poll(self: &Arc<Self>, delay: Duration, epoch: u64) -> TimerHandle {
        let inner = Arc::clone(self);
        self.scheduler
            .schedule(delay, Box::pin(async move { inner.poll(epoch).await }))
    }

    /// Apply `update` unless a reset or a newer run superseded `epoch`
    fn update_if_current<F>(&self, epoch: u64, update: F) -> bool
    where
        F: FnOnce(&mut RunnerView),
    {
        let mut control = self.control();
        if control.epoch != epoch {
            return false;
        }
        control.timer = None;
        self.view.send_modify(update);
        true
    }

    async fn poll(self: &Arc<Self>, epoch: u64) {
        {
            let mut control = self.control();
            if control.epoch != epoch {
                return;
            }
            // The timer that started this poll has fired
            control.timer = None;
        }

        let state = match self.backend.job_status().await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Job runner poll failed: {}", e);
                self.update_if_current(epoch, |view| {
                    view.status = RunnerStatus::Error;
                    view.message = "Failed to fetch job status".to_string();
                    view.loading = false;
                });
                return;
            }
        };

        tracing::debug!("Job runner observed {:?}", state.status);
        let message = state.message.clone().filter(|m| !m.is_empty());
        match state.status {
            JobStatus::Running => {
                let mut control = self.control();
                if control.epoch != epoch {
                    return;
                }
                self.view.send_modify(|view| {
                    view.status = RunnerStatus::Running;
                    view.message = message.unwrap_or_else(|| "Job is running".to_string());
                    view.job_id = state.job_id;
                });
                control.timer = Some(self.schedule_poll(self.poll_interval, epoch));
            }
            JobStatus::Completed => {
                let applied = self.update_if_current(epoch, |view| {
                    view.status = RunnerStatus::Success;
                    view.message = message.unwrap_or_else(|| "Job completed".to_string());
                    view.job_id = state.job_id;
                    view.result = state.result;
                    view.loading = false;
                });
                if applied {
                    if let Some(hook) = &self.on_success {
                        let view = self.view.borrow().clone();
                        hook(&view);
                    }
                }
            }
            JobStatus::Failed => {
                self.update_if_current(epoch, |view| {
                    view.status = RunnerStatus::Error;
                    view.message = message.unwrap_or_else(|| "Job failed".to_string());
                    view.job_id = state.job_id;
                    view.result = state.result;
                    view.loading = false;
                });
            }
            JobStatus::Idle => {
                self.update_if_current(epoch, |view| {
                    view.status = RunnerStatus::Idle;
                    view.message = message.unwrap_or_default();
                    view.job_id = state.job_id;
                    view.result = state.result;
                    view.loading = false;
                });
            }
        }
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("view", &*self.inner.view.borrow())
            .finish()
    }
}
