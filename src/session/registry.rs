// src/session/registry.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::bank::QuestionBank;
use crate::error::AppError;
use crate::models::attempt::{FrozenAttempt, TerminationReason};
use crate::models::report::ScoreReport;
use crate::models::test::TestSnapshot;
use crate::session::expiry::ExpiryScheduler;
use crate::session::state::{SessionState, SolutionReveal, TestSession};
use crate::storage::AttemptStore;

/// What `start` hands back to the transport layer.
#[derive(Debug)]
pub struct StartedSession {
    pub session_id: Uuid,
    pub snapshot: Arc<TestSnapshot>,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a session.
#[derive(Debug, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: i64,
    /// Present only while the session is Active and timed.
    pub remaining_seconds: Option<i64>,
    pub answered_count: usize,
    pub total_count: usize,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, Arc<Mutex<TestSession>>>,
    /// Invariant: at most one Active session per (user, test) pair.
    active: HashMap<(i64, i64), Uuid>,
}

/// Owns every session's state and serializes all mutating operations on a
/// given session behind its own mutex. Different sessions share no locks,
/// so throughput scales with the number of concurrent test-takers.
///
/// Terminal sessions stay in the map: status and submit remain answerable
/// after the freeze, and repeat submissions return the existing report.
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
    bank: Arc<dyn QuestionBank>,
    store: Arc<dyn AttemptStore>,
    scheduler: Arc<ExpiryScheduler>,
}

impl SessionRegistry {
    /// Creates the registry and spawns its expiry worker. Must be called
    /// from within a tokio runtime.
    pub fn new(bank: Arc<dyn QuestionBank>, store: Arc<dyn AttemptStore>) -> Arc<Self> {
        let registry = Arc::new(Self {
            inner: RwLock::new(RegistryInner::default()),
            bank,
            store,
            scheduler: Arc::new(ExpiryScheduler::new()),
        });
        // Detached on purpose; the worker lives as long as the runtime.
        let _ = registry.scheduler.spawn(Arc::clone(&registry));
        registry
    }

    /// Starts a new attempt bound to a fresh bank snapshot.
    ///
    /// The duplicate-active check and the index insertion happen under one
    /// write lock, so two racing starts for the same (user, test) pair
    /// resolve to exactly one winner.
    pub async fn start(
        &self,
        test_id: i64,
        user_id: i64,
        duration_override_secs: Option<u32>,
    ) -> Result<StartedSession, AppError> {
        let snapshot = Arc::new(self.bank.snapshot(test_id).await?);
        let duration_secs = duration_override_secs.or(snapshot.duration_seconds);

        let now = Utc::now();
        let expires_at = duration_secs.map(|secs| now + Duration::seconds(secs as i64));
        let session_id = Uuid::new_v4();

        {
            let mut inner = self.inner.write().await;
            if let Some(&existing) = inner.active.get(&(user_id, test_id)) {
                // The index entry may be a leftover from a session frozen a
                // moment ago; try_lock keeps this check deadlock-free.
                let stale = inner
                    .sessions
                    .get(&existing)
                    .and_then(|cell| cell.try_lock().ok().map(|s| s.state().is_terminal()))
                    .unwrap_or(false);
                if !stale {
                    return Err(AppError::DuplicateActiveSession { test_id });
                }
                inner.active.remove(&(user_id, test_id));
            }

            let session = TestSession::new(
                session_id,
                test_id,
                user_id,
                Arc::clone(&snapshot),
                now,
                expires_at,
            );
            inner
                .sessions
                .insert(session_id, Arc::new(Mutex::new(session)));
            inner.active.insert((user_id, test_id), session_id);
        }

        if let Some(deadline) = expires_at {
            self.scheduler.register(session_id, deadline);
        }
        tracing::info!(
            "Started session {} for user {} on test {}",
            session_id,
            user_id,
            test_id
        );

        Ok(StartedSession {
            session_id,
            snapshot,
            started_at: now,
            expires_at,
        })
    }

    pub async fn status(&self, session_id: Uuid, user_id: i64) -> Result<SessionStatus, AppError> {
        let cell = self.lookup(session_id).await?;
        let now = Utc::now();
        let (status, frozen) = {
            let mut session = cell.lock().await;
            Self::ensure_owner(&session, user_id)?;
            let frozen = Self::expire_overdue_locked(&mut session, now);

            let remaining_seconds = if session.state() == SessionState::Active {
                session.expires_at().map(|d| (d - now).num_seconds().max(0))
            } else {
                None
            };
            let status = SessionStatus {
                state: session.state(),
                started_at: session.started_at(),
                expires_at: session.expires_at(),
                elapsed_seconds: (now - session.started_at()).num_seconds().max(0),
                remaining_seconds,
                answered_count: session.answered_count(),
                total_count: session.snapshot().questions.len(),
            };
            (status, frozen)
        };

        if let Some(frozen) = frozen {
            self.finalize(frozen).await;
        }
        Ok(status)
    }

    pub async fn record_answer(
        &self,
        session_id: Uuid,
        user_id: i64,
        question_id: &str,
        option_id: &str,
    ) -> Result<(), AppError> {
        let cell = self.lookup(session_id).await?;
        let now = Utc::now();
        let (result, frozen) = {
            let mut session = cell.lock().await;
            Self::ensure_owner(&session, user_id)?;
            let frozen = Self::expire_overdue_locked(&mut session, now);
            let result = session.record_answer(question_id, option_id, now);
            (result, frozen)
        };

        if let Some(frozen) = frozen {
            self.finalize(frozen).await;
        }
        result
    }

    pub async fn reveal_hint(
        &self,
        session_id: Uuid,
        user_id: i64,
        question_id: &str,
    ) -> Result<String, AppError> {
        let cell = self.lookup(session_id).await?;
        let now = Utc::now();
        let (result, frozen) = {
            let mut session = cell.lock().await;
            Self::ensure_owner(&session, user_id)?;
            let frozen = Self::expire_overdue_locked(&mut session, now);
            let result = session.reveal_hint(question_id, now);
            (result, frozen)
        };

        if let Some(frozen) = frozen {
            self.finalize(frozen).await;
        }
        result
    }

    pub async fn reveal_solution(
        &self,
        session_id: Uuid,
        user_id: i64,
        question_id: &str,
    ) -> Result<SolutionReveal, AppError> {
        let cell = self.lookup(session_id).await?;
        let now = Utc::now();
        let (result, frozen) = {
            let mut session = cell.lock().await;
            Self::ensure_owner(&session, user_id)?;
            let frozen = Self::expire_overdue_locked(&mut session, now);
            let result = session.reveal_solution(question_id, now);
            (result, frozen)
        };

        if let Some(frozen) = frozen {
            self.finalize(frozen).await;
        }
        result
    }

    /// The single state-changing entry point shared by manual submission
    /// and the expiry worker. Whoever wins the race performs the scoring
    /// exactly once; the loser gets the already-computed report back.
    pub async fn submit(
        &self,
        session_id: Uuid,
        user_id: i64,
        answers: Option<&HashMap<String, String>>,
    ) -> Result<Arc<ScoreReport>, AppError> {
        let cell = self.lookup(session_id).await?;
        let now = Utc::now();
        let (report, frozen) = {
            let mut session = cell.lock().await;
            Self::ensure_owner(&session, user_id)?;
            let mut frozen = Self::expire_overdue_locked(&mut session, now);

            if session.state() == SessionState::Active {
                if let Some(answers) = answers {
                    session.merge_answers(answers, now)?;
                }
            }

            let (report, performed) = session.freeze(TerminationReason::Submitted, now);
            if performed {
                frozen = Some(session.frozen_attempt(Arc::clone(&report)));
            }
            (report, frozen)
        };

        if let Some(frozen) = frozen {
            self.finalize(frozen).await;
        }
        Ok(report)
    }

    /// Expiry-worker entry point: drives the session out of Active once
    /// its deadline has passed. Safe to call late or more than once.
    pub async fn expire(&self, session_id: Uuid) -> Result<(), AppError> {
        let cell = self.lookup(session_id).await?;
        let now = Utc::now();
        let frozen = {
            let mut session = cell.lock().await;
            Self::expire_overdue_locked(&mut session, now)
        };

        match frozen {
            Some(frozen) => self.finalize(frozen).await,
            None => {
                // Woken a hair before the deadline: put the entry back.
                let session = cell.lock().await;
                if session.state() == SessionState::Active {
                    if let Some(deadline) = session.expires_at() {
                        self.scheduler.register(session_id, deadline);
                    }
                }
            }
        }
        Ok(())
    }

    async fn lookup(&self, session_id: Uuid) -> Result<Arc<Mutex<TestSession>>, AppError> {
        let inner = self.inner.read().await;
        inner
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(AppError::SessionNotFound(session_id))
    }

    /// A session is only visible to the user who started it.
    fn ensure_owner(session: &TestSession, user_id: i64) -> Result<(), AppError> {
        if session.user_id() != user_id {
            return Err(AppError::SessionNotFound(session.id()));
        }
        Ok(())
    }

    /// Runs the idempotent expiry transition when the deadline has passed
    /// and nobody froze the session yet. Keeps a stalled scheduler from
    /// turning into lost scoring: any later operation drives it here.
    fn expire_overdue_locked(
        session: &mut TestSession,
        now: DateTime<Utc>,
    ) -> Option<FrozenAttempt> {
        if !session.is_overdue(now) {
            return None;
        }
        let (report, performed) = session.freeze(TerminationReason::Expired, now);
        performed.then(|| session.frozen_attempt(report))
    }

    /// Post-freeze bookkeeping: active-index cleanup, scheduler
    /// cancellation and the storage handoff. A persistence failure is
    /// logged and never unfreezes the session.
    async fn finalize(&self, frozen: FrozenAttempt) {
        {
            let mut inner = self.inner.write().await;
            let key = (frozen.user_id, frozen.test_id);
            if inner.active.get(&key) == Some(&frozen.attempt_id) {
                inner.active.remove(&key);
            }
        }
        self.scheduler.cancel(frozen.attempt_id);
        tracing::info!(
            "Session {} frozen ({}), score {}/{}",
            frozen.attempt_id,
            frozen.termination.as_str(),
            frozen.report.total_score,
            frozen.report.max_score
        );

        if let Err(e) = self.store.persist(&frozen).await {
            tracing::error!("Failed to persist attempt {}: {}", frozen.attempt_id, e);
        }
    }
}
