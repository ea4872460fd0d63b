// src/session/expiry.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::session::registry::SessionRegistry;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ExpiryEntry {
    deadline: DateTime<Utc>,
    session_id: Uuid,
}

#[derive(Default)]
struct SchedulerInner {
    queue: BinaryHeap<Reverse<ExpiryEntry>>,
    /// Tombstones for cancelled sessions. Heap entries are not searched;
    /// a cancelled id is dropped when it surfaces at the top.
    cancelled: HashSet<Uuid>,
}

/// Time-ordered set of session deadlines with a single worker that fires
/// the expiry submission for whichever deadline comes up next.
///
/// Guarantees at-least-once firing at or after the deadline; a late or
/// duplicate firing is harmless because the registry's submission is
/// idempotent. Cancellation is best-effort for the same reason.
pub struct ExpiryScheduler {
    inner: Mutex<SchedulerInner>,
    notify: Notify,
}

impl ExpiryScheduler {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SchedulerInner::default()),
            notify: Notify::new(),
        }
    }

    /// Adds a deadline and wakes the worker in case it became the nearest.
    pub fn register(&self, session_id: Uuid, deadline: DateTime<Utc>) {
        {
            let mut inner = self.inner.lock().expect("scheduler lock poisoned");
            inner.cancelled.remove(&session_id);
            inner.queue.push(Reverse(ExpiryEntry {
                deadline,
                session_id,
            }));
        }
        self.notify.notify_one();
    }

    /// Drops a pending deadline once its session reached a terminal state
    /// through another path.
    pub fn cancel(&self, session_id: Uuid) {
        {
            let mut inner = self.inner.lock().expect("scheduler lock poisoned");
            inner.cancelled.insert(session_id);
        }
        self.notify.notify_one();
    }

    /// Pops the next session whose deadline is at or before `now`,
    /// skipping cancelled entries.
    fn pop_due(&self, now: DateTime<Utc>) -> Option<Uuid> {
        let mut inner = self.inner.lock().expect("scheduler lock poisoned");
        while let Some(Reverse(entry)) = inner.queue.peek().cloned() {
            if entry.deadline > now {
                break;
            }
            inner.queue.pop();
            if inner.cancelled.remove(&entry.session_id) {
                continue;
            }
            return Some(entry.session_id);
        }
        None
    }

    fn next_deadline(&self) -> Option<DateTime<Utc>> {
        let inner = self.inner.lock().expect("scheduler lock poisoned");
        inner.queue.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Spawns the wake-and-fire worker. It sleeps until the nearest
    /// deadline and re-evaluates whenever a register/cancel call lands.
    pub fn spawn(self: &Arc<Self>, registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if let Some(session_id) = scheduler.pop_due(Utc::now()) {
                    tracing::debug!("Deadline reached for session {}", session_id);
                    if let Err(e) = registry.expire(session_id).await {
                        tracing::warn!("Auto-submit for session {} failed: {}", session_id, e);
                    }
                    continue;
                }

                match scheduler.next_deadline() {
                    Some(deadline) => {
                        let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {}
                            _ = scheduler.notify.notified() => {}
                        }
                    }
                    None => scheduler.notify.notified().await,
                }
            }
        })
    }
}

impl Default for ExpiryScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn pop_due_returns_entries_in_deadline_order() {
        let scheduler = ExpiryScheduler::new();
        let now = Utc::now();
        let late = Uuid::new_v4();
        let early = Uuid::new_v4();

        scheduler.register(late, now - ChronoDuration::seconds(1));
        scheduler.register(early, now - ChronoDuration::seconds(10));

        assert_eq!(scheduler.pop_due(now), Some(early));
        assert_eq!(scheduler.pop_due(now), Some(late));
        assert_eq!(scheduler.pop_due(now), None);
    }

    #[test]
    fn pop_due_ignores_future_deadlines() {
        let scheduler = ExpiryScheduler::new();
        let now = Utc::now();

        scheduler.register(Uuid::new_v4(), now + ChronoDuration::seconds(60));

        assert_eq!(scheduler.pop_due(now), None);
        assert!(scheduler.next_deadline().is_some());
    }

    #[test]
    fn cancelled_entries_are_skipped() {
        let scheduler = ExpiryScheduler::new();
        let now = Utc::now();
        let cancelled = Uuid::new_v4();
        let kept = Uuid::new_v4();

        scheduler.register(cancelled, now - ChronoDuration::seconds(5));
        scheduler.register(kept, now - ChronoDuration::seconds(1));
        scheduler.cancel(cancelled);

        assert_eq!(scheduler.pop_due(now), Some(kept));
        assert_eq!(scheduler.pop_due(now), None);
    }

    #[test]
    fn re_register_after_cancel_fires_again() {
        let scheduler = ExpiryScheduler::new();
        let now = Utc::now();
        let id = Uuid::new_v4();

        scheduler.register(id, now - ChronoDuration::seconds(1));
        scheduler.cancel(id);
        scheduler.register(id, now - ChronoDuration::seconds(1));

        // The re-registered deadline must fire; a duplicate firing from the
        // stale entry would be absorbed by the idempotent submission anyway.
        assert_eq!(scheduler.pop_due(now), Some(id));
    }
}
