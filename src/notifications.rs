//! Ephemeral, self-expiring user notices.
//!
//! Notices are advisory only. They never feed back into
//! [`SessionState`](crate::session::SessionState).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Default lifetime of a notice.
pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(3);

/// How a notice should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A single transient notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub severity: Severity,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Notification>,
    timers: HashMap<Uuid, JoinHandle<()>>,
}

/// Cloneable handle to a queue of notices that remove themselves after a
/// fixed time-to-live.
///
/// Each [`push`](Self::push) spawns a removal task on the current tokio
/// runtime, so it must be called from within one.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<StdMutex<Inner>>,
    ttl: Duration,
}

impl NotificationQueue {
    /// Create an empty queue whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(StdMutex::new(Inner::default())),
            ttl,
        }
    }

    /// Append a notice and schedule its removal. Returns the notice id.
    pub fn push(&self, message: impl Into<String>, severity: Severity) -> Uuid {
        let id = Uuid::new_v4();
        let notification = Notification {
            id,
            message: message.into(),
            severity,
        };
        debug!(%id, ?severity, message = %notification.message, "notification pushed");

        // Hold the lock while spawning so the timer cannot run before the
        // entry and its handle are both recorded.
        let mut inner = self.lock();
        inner.entries.push(notification);

        let weak = Arc::downgrade(&self.inner);
        let ttl = self.ttl;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = weak.upgrade() {
                let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                inner.entries.retain(|n| n.id != id);
                inner.timers.remove(&id);
            }
        });
        inner.timers.insert(id, timer);
        id
    }

    /// Current notices, oldest first.
    pub fn list(&self) -> Vec<Notification> {
        self.lock().entries.clone()
    }

    /// Number of live notices.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if there are no live notices.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drop a notice before its time-to-live elapses.
    pub fn dismiss(&self, id: Uuid) {
        let mut inner = self.lock();
        inner.entries.retain(|n| n.id != id);
        if let Some(timer) = inner.timers.remove(&id) {
            timer.abort();
        }
    }

    /// Remove every notice and cancel all pending removal timers.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        for (_, timer) in inner.timers.drain() {
            timer.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_TTL)
    }
}

impl std::fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn notices_expire_after_ttl() {
        let queue = NotificationQueue::default();
        queue.push("bob unlocked Key 1!", Severity::Success);
        assert_eq!(queue.len(), 1);

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(queue.len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn each_notice_has_its_own_window() {
        let queue = NotificationQueue::default();
        let first = queue.push("first", Severity::Info);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let second = queue.push("second", Severity::Warning);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let ids: Vec<Uuid> = queue.list().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![second]);
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_pending_timers() {
        let queue = NotificationQueue::default();
        queue.push("a", Severity::Info);
        queue.push("b", Severity::Info);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.inner.lock().unwrap().timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_removes_one_notice() {
        let queue = NotificationQueue::new(Duration::from_secs(10));
        let keep = queue.push("keep", Severity::Info);
        let gone = queue.push("gone", Severity::Error);
        queue.dismiss(gone);
        let list = queue.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, keep);
    }
}
