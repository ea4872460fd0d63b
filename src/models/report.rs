// src/models/report.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a single question was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
    Unattempted,
}

/// Per-question line of a score report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: String,
    pub selected_option: Option<String>,
    pub correct_option: String,
    pub outcome: AnswerOutcome,
    pub marks_awarded: i32,
    pub subject: Option<String>,
    pub topic: Option<String>,
    /// Analytics only; hint usage never changes marks.
    pub hint_viewed: bool,
    pub solution_viewed: bool,
}

/// Aggregate over one subject or topic bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupScore {
    pub score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub total_questions: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub unattempted: u32,
}

/// Deterministic result of scoring a frozen attempt.
///
/// The total may be negative under negative marking; the percentage is
/// clamped to [0, 100]. Subject/topic aggregates use BTreeMap so the
/// serialized form is stable for identical inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReport {
    pub total_score: i32,
    pub max_score: i32,
    pub percentage: f64,
    pub questions: Vec<QuestionOutcome>,
    pub subjects: BTreeMap<String, GroupScore>,
    pub topics: BTreeMap<String, GroupScore>,
}
