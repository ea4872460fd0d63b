// src/models/attempt.rs

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::report::ScoreReport;

/// How a session left the `Active` state. Both paths score identically;
/// only the recorded reason differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationReason {
    Submitted,
    Expired,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Submitted => "submitted",
            TerminationReason::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "submitted" => Some(TerminationReason::Submitted),
            "expired" => Some(TerminationReason::Expired),
            _ => None,
        }
    }
}

/// Immutable record handed to the attempt store the moment a session is
/// frozen. Never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FrozenAttempt {
    pub attempt_id: Uuid,
    pub test_id: i64,
    pub user_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub termination: TerminationReason,
    pub report: Arc<ScoreReport>,
}

/// A persisted attempt read back for the report endpoints.
#[derive(Debug, Serialize)]
pub struct StoredAttempt {
    pub attempt_id: Uuid,
    pub test_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub termination: TerminationReason,
    pub report: ScoreReport,
}

/// One row of a user's attempt history (no per-question detail).
#[derive(Debug, Serialize)]
pub struct AttemptSummary {
    pub attempt_id: Uuid,
    pub test_id: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
    pub termination: TerminationReason,
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: f64,
}

/// DTO for starting a session. Omitting the override means "use the
/// test's configured duration".
#[derive(Debug, Default, Deserialize, Validate)]
pub struct StartSessionRequest {
    /// Overrides the test's configured duration, in seconds.
    #[validate(range(min = 1, max = 86400))]
    pub duration_override_secs: Option<u32>,
}

/// DTO for recording an answer.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    #[validate(length(min = 1, max = 50))]
    pub question_id: String,
    #[validate(length(min = 1, max = 10))]
    pub option_id: String,
}

/// DTO for hint/solution requests, which address a single question.
#[derive(Debug, Deserialize, Validate)]
pub struct QuestionRef {
    #[validate(length(min = 1, max = 50))]
    pub question_id: String,
}

/// DTO for manual submission. Answers supplied here are merged into the
/// ledger (last write wins per question) before the session is frozen.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitSessionRequest {
    pub answers: Option<HashMap<String, String>>,
}
