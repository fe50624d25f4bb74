//! Shared, observable snapshot of a remotely polled resource
//!
//! A [`PollingStore`] polls only while at least one observer is subscribed.
//! The first subscriber arms an immediate poll and each poll arms the next
//! one, both through the [`Scheduler`]. The last unsubscribe cancels whatever
//! timer is armed. An in-flight guard keeps polls from overlapping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;

use crate::scheduler::{Scheduler, TimerHandle};

/// The remote resource behind a [`PollingStore`]
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    type Snapshot: Clone + Send + Sync + 'static;

    /// Name used in log output
    fn name(&self) -> &str;

    /// Snapshot visible before the first poll settles
    fn initial(&self) -> Self::Snapshot;

    /// Fetch a fresh snapshot
    async fn fetch(&self) -> crate::Result<Self::Snapshot>;

    /// Snapshot to commit when a fetch fails
    fn degrade(&self, previous: &Self::Snapshot, error: &crate::ConsoleError) -> Self::Snapshot;

    /// Delay before the poll following `snapshot`
    fn next_delay(&self, snapshot: &Self::Snapshot) -> Duration;
}

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Observers<T> {
    next_id: u64,
    listeners: BTreeMap<u64, Listener<T>>,
    /// Armed timer, tagged with its sequence number; cleared when it fires
    timer: Option<(u64, TimerHandle)>,
    timer_seq: u64,
}

struct Inner<S: PollSource> {
    source: S,
    scheduler: Arc<dyn Scheduler>,
    snapshot: RwLock<Arc<S::Snapshot>>,
    observers: Mutex<Observers<S::Snapshot>>,
    in_flight: AtomicBool,
}

/// Observable store that owns the poll/reschedule loop for one resource
pub struct PollingStore<S: PollSource> {
    inner: Arc<Inner<S>>,
}

impl<S: PollSource> Clone for PollingStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PollSource> PollingStore<S> {
    pub fn new(source: S, scheduler: Arc<dyn Scheduler>) -> Self {
        let initial = source.initial();
        Self {
            inner: Arc::new(Inner {
                source,
                scheduler,
                snapshot: RwLock::new(Arc::new(initial)),
                observers: Mutex::new(Observers {
                    next_id: 0,
                    listeners: BTreeMap::new(),
                    timer: None,
                    timer_seq: 0,
                }),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    /// Last committed snapshot. Never touches the network.
    pub fn snapshot(&self) -> Arc<S::Snapshot> {
        self.inner.current()
    }

    /// Attach an observer. The first observer arms a zero-delay poll.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&S::Snapshot) + Send + Sync + 'static,
    {
        let id = {
            let mut observers = self.inner.lock_observers();
            let id = observers.next_id;
            observers.next_id += 1;
            observers.listeners.insert(id, Arc::new(listener));
            if observers.listeners.len() == 1 {
                tracing::debug!("First observer of '{}', polling now", self.inner.source.name());
                self.inner.arm(&mut observers, Duration::ZERO);
            }
            id
        };

        let weak: Weak<Inner<S>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.remove_listener(id);
                }
            })),
        }
    }

    /// Number of attached observers
    pub fn observer_count(&self) -> usize {
        self.inner.lock_observers().listeners.len()
    }

    /// Whether a timer is armed and has not fired yet
    pub fn has_pending_poll(&self) -> bool {
        self.inner
            .lock_observers()
            .timer
            .as_ref()
            .is_some_and(|(_, t)| !t.is_cancelled())
    }

    /// Run one poll now; a no-op while another poll is in flight
    pub async fn poll(&self) {
        self.inner.poll().await;
    }
}

impl<S: PollSource> Inner<S> {
    fn current(&self) -> Arc<S::Snapshot> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn commit(&self, next: S::Snapshot) -> Arc<S::Snapshot> {
        let next = Arc::new(next);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = Arc::clone(&next),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&next),
        }
        next
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, Observers<S::Snapshot>> {
        match self.observers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn remove_listener(&self, id: u64) {
        let mut observers = self.lock_observers();
        observers.listeners.remove(&id);
        if observers.listeners.is_empty() {
            if let Some((_, timer)) = observers.timer.take() {
                tracing::debug!(
                    "Last observer of '{}' left, cancelling next poll",
                    self.source.name()
                );
                self.scheduler.cancel(&timer);
            }
        }
    }

    async fn poll(self: &Arc<Self>) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("Poll of '{}' already in flight", self.source.name());
            return;
        }

        let next = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Polling '{}' failed: {}", self.source.name(), e);
                self.source.degrade(&self.current(), &e)
            }
        };
        let committed = self.commit(next);
        self.in_flight.store(false, Ordering::SeqCst);

        let listeners: Vec<Listener<S::Snapshot>> =
            self.lock_observers().listeners.values().cloned().collect();
        for listener in &listeners {
            listener(&committed);
        }

        self.reschedule(&committed);
    }

    fn reschedule(self: &Arc<Self>, snapshot: &S::Snapshot) {
        let mut observers = self.lock_observers();
        if observers.listeners.is_empty() {
            return;
        }
        let delay = self.source.next_delay(snapshot);
        self.arm(&mut observers, delay);
        tracing::debug!(
            "Next poll of '{}' in {:?}",
            self.source.name(),
            delay
        );
    }

    /// Schedule a poll after `delay`, replacing any armed timer
    fn arm(self: &Arc<Self>, observers: &mut Observers<S::Snapshot>, delay: Duration) {
        observers.timer_seq += 1;
        let seq = observers.timer_seq;
        let inner = Arc::clone(self);
        let timer = self.scheduler.schedule(
            delay,
            Box::pin(async move {
                inner.disarm(seq);
                inner.poll().await;
            }),
        );
        if let Some((_, previous)) = observers.timer.replace((seq, timer)) {
            self.scheduler.cancel(&previous);
        }
    }

    /// Forget timer `seq` once it has fired
    fn disarm(&self, seq: u64) {
        let mut observers = self.lock_observers();
        if observers.timer.as_ref().is_some_and(|(armed, _)| *armed == seq) {
            observers.timer = None;
        }
    }
}

impl<S: PollSource> std::fmt::Debug for PollingStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingStore")
            .field("source", &self.inner.source.name())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Keeps an observer attached; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
