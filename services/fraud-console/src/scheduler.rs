//! Cancellable one-shot timers
//!
//! Every poller in the console is a "poll, then reschedule" chain built on
//! [`Scheduler::schedule`] rather than a fixed-rate interval, so a slow
//! response can never cause two polls of the same resource to overlap.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A unit of deferred work handed to a [`Scheduler`]
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to a scheduled task. Cancelling is idempotent.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Prevent the task from starting. Has no effect once it has started.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Schedule-once / cancel timer primitive
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay` unless the returned handle is cancelled first
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;

    fn cancel(&self, handle: &TimerHandle) {
        handle.cancel();
    }
}

/// Scheduler backed by the tokio timer wheel.
///
/// Under `#[tokio::test(start_paused = true)]` the delays run on tokio's
/// simulated clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle::new();
        let token = handle.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::trace!("Timer cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => {
                    task.await;
                }
            }
        });
        handle
    }
}
