//! Edge-triggered notices for job completion and failure

use std::sync::{Arc, Mutex};

use crate::job::{JobSnapshot, JobStatus, JobStatusStore};
use crate::notice::{NewNotice, NotificationCenter};
use crate::store::Subscription;

/// The `(status, job_id)` pair remembered between observations
pub type Observation = (JobStatus, Option<String>);

/// A resolved job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEdge {
    Completed { job_id: Option<String> },
    Failed { job_id: Option<String> },
}

/// Only `Running -> Completed` or `Running -> Failed` on the same job id is an edge
pub fn detect_edge(previous: Option<&Observation>, current: &Observation) -> Option<JobEdge> {
    let (prev_status, prev_id) = previous?;
    let (status, job_id) = current;
    if *prev_status != JobStatus::Running || prev_id != job_id {
        return None;
    }
    match status {
        JobStatus::Completed => Some(JobEdge::Completed {
            job_id: job_id.clone(),
        }),
        JobStatus::Failed => Some(JobEdge::Failed {
            job_id: job_id.clone(),
        }),
        JobStatus::Idle | JobStatus::Running => None,
    }
}

/// Publishes one persistent notice per observed job resolution
#[derive(Debug)]
pub struct JobTransitionNotifier {
    notices: NotificationCenter,
    previous: Mutex<Option<Observation>>,
}

impl JobTransitionNotifier {
    pub fn new(notices: NotificationCenter) -> Self {
        Self {
            notices,
            previous: Mutex::new(None),
        }
    }

    /// Feed one job-store snapshot. Returns the edge if a notice was published.
    pub fn observe(&self, snapshot: &JobSnapshot) -> Option<JobEdge> {
        let job = snapshot.job.as_ref()?;
        let current = (job.status, job.job_id.clone());

        let edge = {
            let mut previous = self
                .previous
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let edge = detect_edge(previous.as_ref(), &current);
            *previous = Some(current);
            edge
        };

        let edge = edge?;
        let label = job.job_id.as_deref().unwrap_or("job");
        let notice = match &edge {
            JobEdge::Completed { .. } => NewNotice::success("Job completed").with_description(
                job.message
                    .clone()
                    .unwrap_or_else(|| format!("{} finished", label)),
            ),
            JobEdge::Failed { .. } => NewNotice::error("Job failed").with_description(
                job.message
                    .clone()
                    .unwrap_or_else(|| format!("{} failed", label)),
            ),
        };
        tracing::info!("Job '{}' resolved: {:?}", label, edge);
        self.notices.notify(notice.persistent());
        Some(edge)
    }

    /// Observe every snapshot the store commits for as long as the subscription lives
    pub fn attach(self: &Arc<Self>, store: &JobStatusStore) -> Subscription {
        let notifier = Arc::clone(self);
        store.subscribe(move |snapshot| {
            notifier.observe(snapshot);
        })
    }
}
