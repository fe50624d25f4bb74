//! Bounded registry of operator notices with auto-dismiss timers

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::NotificationConfig;
use crate::scheduler::{Scheduler, TimerHandle};

pub type NoticeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeVariant {
    Info,
    Success,
    Warning,
    Error,
}

/// How long a notice stays up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoticeDuration {
    /// The center's configured default
    #[default]
    Default,
    /// Until the operator dismisses it
    Persistent,
    /// A zero duration behaves like `Persistent`
    After(Duration),
}

/// A notice as handed to [`NotificationCenter::notify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotice {
    pub title: String,
    pub description: Option<String>,
    pub variant: NoticeVariant,
    pub duration: NoticeDuration,
}

impl NewNotice {
    pub fn new(variant: NoticeVariant, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            variant,
            duration: NoticeDuration::Default,
        }
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NoticeVariant::Info, title)
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(NoticeVariant::Success, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(NoticeVariant::Warning, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(NoticeVariant::Error, title)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_duration(mut self, duration: NoticeDuration) -> Self {
        self.duration = duration;
        self
    }

    pub fn persistent(self) -> Self {
        self.with_duration(NoticeDuration::Persistent)
    }
}

/// A published notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub id: NoticeId,
    pub title: String,
    pub description: Option<String>,
    pub variant: NoticeVariant,
    /// `None` while the notice persists until dismissed
    pub duration_ms: Option<u64>,
    pub created_at_epoch_ms: i64,
}

#[derive(Default)]
struct Registry {
    /// Newest first
    notices: VecDeque<Notice>,
    timers: HashMap<NoticeId, TimerHandle>,
}

struct Inner {
    scheduler: Arc<dyn Scheduler>,
    default_duration: Duration,
    capacity: usize,
    registry: Mutex<Registry>,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dismiss(&self, id: &str) -> bool {
        let mut registry = self.registry();
        if let Some(timer) = registry.timers.remove(id) {
            self.scheduler.cancel(&timer);
        }
        let before = registry.notices.len();
        registry.notices.retain(|n| n.id != id);
        registry.notices.len() != before
    }
}

/// The operator-facing notice list.
///
/// All mutation goes through [`notify`](Self::notify) and
/// [`dismiss`](Self::dismiss). Cloning yields another handle to the same
/// registry.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl NotificationCenter {
    pub fn new(config: &NotificationConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler,
                default_duration: config.default_duration(),
                capacity: config.capacity.max(1),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Publish a notice and return its id
    pub fn notify(&self, notice: NewNotice) -> NoticeId {
        let id = uuid::Uuid::new_v4().to_string();
        let duration = match notice.duration {
            NoticeDuration::Default => Some(self.inner.default_duration),
            NoticeDuration::Persistent => None,
            NoticeDuration::After(d) => Some(d),
        }
        .filter(|d| !d.is_zero());

        tracing::info!(
            "Notice [{:?}] {}{}",
            notice.variant,
            notice.title,
            notice
                .description
                .as_deref()
                .map(|d| format!(": {}", d))
                .unwrap_or_default()
        );

        let mut registry = self.inner.registry();
        registry.notices.push_front(Notice {
            id: id.clone(),
            title: notice.title,
            description: notice.description,
            variant: notice.variant,
            duration_ms: duration.map(|d| d.as_millis() as u64),
            created_at_epoch_ms: chrono::Utc::now().timestamp_millis(),
        });

        while registry.notices.len() > self.inner.capacity {
            if let Some(evicted) = registry.notices.pop_back() {
                tracing::debug!("Evicting notice {}", evicted.id);
                if let Some(timer) = registry.timers.remove(&evicted.id) {
                    self.inner.scheduler.cancel(&timer);
                }
            }
        }

        if let Some(delay) = duration {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let timer_id = id.clone();
            let handle = self.inner.scheduler.schedule(
                delay,
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        tracing::debug!("Notice {} expired", timer_id);
                        inner.dismiss(&timer_id);
                    }
                }),
            );
            registry.timers.insert(id.clone(), handle);
        }

        id
    }

    /// Remove a notice and cancel its timer. Unknown ids are ignored.
    pub fn dismiss(&self, id: &str) -> bool {
        self.inner.dismiss(id)
    }

    /// Current notices, newest first
    pub fn notices(&self) -> Vec<Notice> {
        self.inner.registry().notices.iter().cloned().collect()
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.registry().timers.len()
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("capacity", &self.inner.capacity)
            .field("notices", &self.inner.registry().notices.len())
            .finish()
    }
}
