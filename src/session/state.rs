// src/session/state.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::attempt::{FrozenAttempt, TerminationReason};
use crate::models::report::ScoreReport;
use crate::models::test::TestSnapshot;
use crate::scoring;
use crate::session::ledger::AnswerLedger;

/// State of a test session. Transitions are one-directional:
/// `Active -> {Completed, Expired}`, nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Completed,
    Expired,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Active)
    }
}

/// What a reveal call returns, sourced from the bank snapshot.
#[derive(Debug, Serialize)]
pub struct SolutionReveal {
    pub question_id: String,
    pub correct_option_id: String,
    pub explanation: Option<String>,
}

/// One user's run through a test. Owned by the session registry; every
/// mutating call is linearized behind the registry's per-session mutex, so
/// the methods here can stay plain `&mut self`.
#[derive(Debug)]
pub struct TestSession {
    id: Uuid,
    test_id: i64,
    user_id: i64,
    state: SessionState,
    started_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    snapshot: Arc<TestSnapshot>,
    ledger: AnswerLedger,
    completed_at: Option<DateTime<Utc>>,
    termination: Option<TerminationReason>,
    report: Option<Arc<ScoreReport>>,
}

impl TestSession {
    pub fn new(
        id: Uuid,
        test_id: i64,
        user_id: i64,
        snapshot: Arc<TestSnapshot>,
        started_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            test_id,
            user_id,
            state: SessionState::Active,
            started_at,
            expires_at,
            snapshot,
            ledger: AnswerLedger::new(),
            completed_at: None,
            termination: None,
            report: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn snapshot(&self) -> &Arc<TestSnapshot> {
        &self.snapshot
    }

    pub fn answered_count(&self) -> usize {
        self.ledger.answered_count()
    }

    /// True while the session is Active but its deadline has passed, i.e.
    /// the expiry transition is due but has not run yet.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Active
            && self.expires_at.map(|deadline| now >= deadline).unwrap_or(false)
    }

    fn ensure_active(&self) -> Result<(), AppError> {
        if self.state.is_terminal() {
            return Err(AppError::SessionNotActive(self.id));
        }
        Ok(())
    }

    pub fn record_answer(
        &mut self,
        question_id: &str,
        option_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.ensure_active()?;
        let snapshot = Arc::clone(&self.snapshot);
        self.ledger.record_answer(&snapshot, question_id, option_id, now)
    }

    pub fn merge_answers(
        &mut self,
        answers: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.ensure_active()?;
        let snapshot = Arc::clone(&self.snapshot);
        self.ledger.merge_answers(&snapshot, answers, now)
    }

    /// Marks the hint as viewed and returns the hint text.
    pub fn reveal_hint(&mut self, question_id: &str, now: DateTime<Utc>) -> Result<String, AppError> {
        self.ensure_active()?;
        let snapshot = Arc::clone(&self.snapshot);
        let question = snapshot
            .question(question_id)
            .ok_or_else(|| AppError::InvalidQuestionId(question_id.to_string()))?;
        let hint = question.hint.clone().ok_or_else(|| {
            AppError::NotFound(format!("Question '{}' has no hint", question_id))
        })?;
        self.ledger.mark_hint_viewed(&snapshot, question_id, now)?;
        Ok(hint)
    }

    /// Marks the solution as viewed, locking the answer, and returns the
    /// correct option and explanation from the bank snapshot.
    pub fn reveal_solution(
        &mut self,
        question_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SolutionReveal, AppError> {
        self.ensure_active()?;
        let snapshot = Arc::clone(&self.snapshot);
        let question = snapshot
            .question(question_id)
            .ok_or_else(|| AppError::InvalidQuestionId(question_id.to_string()))?;
        self.ledger.mark_solution_viewed(&snapshot, question_id, now)?;
        Ok(SolutionReveal {
            question_id: question.id.clone(),
            correct_option_id: question.correct_option.clone(),
            explanation: question.explanation.clone(),
        })
    }

    /// The single transition out of Active: scores the ledger exactly once
    /// and freezes the session. Returns the report and whether this call
    /// performed the transition; a session already terminal returns its
    /// existing report unchanged, which makes submission idempotent.
    pub fn freeze(
        &mut self,
        reason: TerminationReason,
        now: DateTime<Utc>,
    ) -> (Arc<ScoreReport>, bool) {
        if let Some(report) = &self.report {
            return (Arc::clone(report), false);
        }

        let report = Arc::new(scoring::score(&self.snapshot, &self.ledger));
        self.state = match reason {
            TerminationReason::Submitted => SessionState::Completed,
            TerminationReason::Expired => SessionState::Expired,
        };
        self.completed_at = Some(now);
        self.termination = Some(reason);
        self.report = Some(Arc::clone(&report));
        (report, true)
    }

    /// Builds the immutable record handed to the attempt store. Only
    /// meaningful right after a winning `freeze` call.
    pub fn frozen_attempt(&self, report: Arc<ScoreReport>) -> FrozenAttempt {
        FrozenAttempt {
            attempt_id: self.id,
            test_id: self.test_id,
            user_id: self.user_id,
            started_at: self.started_at,
            completed_at: self.completed_at.unwrap_or(self.started_at),
            termination: self.termination.unwrap_or(TerminationReason::Submitted),
            report,
        }
    }
}
