//! BDD test world for the fraud console

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cucumber::World;
use tokio::sync::Notify;

use fraud_console::backend::{Backend, ListQuery, TriggerResponse};
use fraud_console::export::{CapConfirmation, ExportOutcome, ExportProgress};
use fraud_console::health::HealthState;
use fraud_console::job::{JobKind, JobState, JobStatusStore};
use fraud_console::notice::NotificationCenter;
use fraud_console::runner::JobRunner;
use fraud_console::scheduler::{Scheduler, Task, TimerHandle};
use fraud_console::store::Subscription;
use fraud_console::suspicious::{SuspiciousItem, SuspiciousKind, SuspiciousPage};
use fraud_console::transition::JobTransitionNotifier;

/// Scheduler whose timers only fire when a step says so
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(Duration, Task, TimerHandle)>>,
}

impl ManualScheduler {
    /// Delays of timers that are still armed, in scheduling order
    pub fn pending_delays(&self) -> Vec<Duration> {
        let mut pending = self.pending.lock().unwrap();
        pending.retain(|(_, _, handle)| !handle.is_cancelled());
        pending.iter().map(|(delay, _, _)| *delay).collect()
    }

    /// Run the oldest armed timer. Returns false when none is armed.
    pub async fn fire_next(&self) -> bool {
        let task = {
            let mut pending = self.pending.lock().unwrap();
            pending.retain(|(_, _, handle)| !handle.is_cancelled());
            if pending.is_empty() {
                return false;
            }
            let (_, task, _) = pending.remove(0);
            task
        };
        task.await;
        true
    }

    /// Spawn every armed zero-delay timer, as a runtime would on its next tick
    pub fn fire_due(&self) {
        let due: Vec<Task> = {
            let mut pending = self.pending.lock().unwrap();
            pending.retain(|(_, _, handle)| !handle.is_cancelled());
            let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut *pending)
                .into_iter()
                .partition(|(delay, _, _)| delay.is_zero());
            *pending = later;
            due.into_iter().map(|(_, task, _)| task).collect()
        };
        for task in due {
            tokio::spawn(task);
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        self.pending
            .lock()
            .unwrap()
            .push((delay, task, handle.clone()));
        handle
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending_delays())
            .finish()
    }
}

/// In-memory backend with scripted replies
#[derive(Debug, Default)]
pub struct FakeBackend {
    /// Replies to job-status requests; the last one repeats
    pub job_replies: Mutex<VecDeque<Option<JobState>>>,
    pub job_requests: AtomicUsize,
    /// When set, job-status requests wait for `release`
    pub hold_job_status: Mutex<bool>,
    pub release: Notify,
    pub suspicious_total: Mutex<usize>,
    pub suspicious_available: Mutex<usize>,
    pub fail_at_offset: Mutex<Option<usize>>,
    pub list_requests: Mutex<Vec<(usize, usize)>>,
}

impl FakeBackend {
    /// Answer every job-status request with `reply` from now on
    pub fn set_job(&self, reply: Option<JobState>) {
        let mut replies = self.job_replies.lock().unwrap();
        replies.clear();
        replies.push_back(reply);
    }

    /// Batch requests, skipping the single-row total probe
    pub fn batches(&self) -> Vec<(usize, usize)> {
        self.list_requests
            .lock()
            .unwrap()
            .iter()
            .skip(1)
            .copied()
            .collect()
    }

    fn next_job_reply(&self) -> Option<JobState> {
        let mut replies = self.job_replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().flatten()
        } else {
            replies.front().cloned().flatten()
        }
    }
}

fn item(n: usize) -> SuspiciousItem {
    SuspiciousItem {
        date: "2026-01-20".to_string(),
        ipaddress: format!("198.51.100.{}", n % 255),
        useragent: "bot/1.0".to_string(),
        total_clicks: Some(n as u64),
        total_conversions: None,
        media_count: 1,
        program_count: 1,
        reasons: vec!["burst".to_string()],
        reasons_formatted: vec![],
        min_click_to_conv_seconds: None,
        max_click_to_conv_seconds: None,
        media_names: vec![],
        program_names: vec![],
        risk_level: None,
        risk_score: None,
        risk_label: None,
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn job_status(&self) -> fraud_console::Result<JobState> {
        self.job_requests.fetch_add(1, Ordering::SeqCst);
        let hold = *self.hold_job_status.lock().unwrap();
        if hold {
            self.release.notified().await;
        }
        self.next_job_reply()
            .ok_or_else(|| fraud_console::ConsoleError::Http("connection refused".to_string()))
    }

    async fn health(&self) -> fraud_console::Result<HealthState> {
        Ok(HealthState::loading())
    }

    async fn list_suspicious(
        &self,
        _kind: SuspiciousKind,
        query: &ListQuery,
    ) -> fraud_console::Result<SuspiciousPage> {
        self.list_requests
            .lock()
            .unwrap()
            .push((query.offset, query.limit));
        if *self.fail_at_offset.lock().unwrap() == Some(query.offset) {
            return Err(fraud_console::ConsoleError::Api {
                status: Some(500),
                detail: "database is locked".to_string(),
            });
        }
        let available = *self.suspicious_available.lock().unwrap();
        let end = (query.offset + query.limit).min(available);
        let start = query.offset.min(end);
        Ok(SuspiciousPage {
            date: None,
            data: (start..end).map(item).collect(),
            total: *self.suspicious_total.lock().unwrap(),
            limit: Some(query.limit),
            offset: Some(query.offset),
        })
    }

    async fn start_job(&self, kind: &JobKind) -> fraud_console::Result<TriggerResponse> {
        Ok(TriggerResponse {
            success: true,
            message: kind.start_message(),
            details: None,
        })
    }
}

#[derive(Debug, Default, World)]
pub struct ConsoleWorld {
    pub scheduler: Arc<ManualScheduler>,
    pub backend: Arc<FakeBackend>,

    // Notification center
    pub notices: Option<NotificationCenter>,
    pub notice_ids: Vec<String>,
    pub dismiss_results: Vec<bool>,

    // Polling store and transitions
    pub job_store: Option<JobStatusStore>,
    pub transitions: Option<Arc<JobTransitionNotifier>>,
    pub subscriptions: Vec<Subscription>,

    // Job runner
    pub runner: Option<JobRunner>,
    pub run_accepted: Vec<bool>,

    // Export
    pub batch_size: usize,
    pub max_rows: usize,
    pub confirmation: Option<CapConfirmation>,
    pub progress: Vec<ExportProgress>,
    pub outcome: Option<fraud_console::Result<ExportOutcome>>,
}

impl ConsoleWorld {
    pub fn notices(&self) -> &NotificationCenter {
        self.notices.as_ref().expect("notification center not created")
    }

    pub fn job_store(&self) -> &JobStatusStore {
        self.job_store.as_ref().expect("job store not created")
    }

    pub fn runner(&self) -> &JobRunner {
        self.runner.as_ref().expect("job runner not created")
    }
}

/// Let spawned polls run to their next suspension point
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
