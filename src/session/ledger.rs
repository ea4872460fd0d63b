// src/session/ledger.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::test::TestSnapshot;

/// Latest state of one question within a session.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub selected_option: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub hint_viewed: bool,
    /// Once set, the selected option is immutable for the rest of the
    /// session: a viewed solution locks the answer.
    pub solution_viewed: bool,
}

impl AnswerRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            selected_option: None,
            updated_at: now,
            hint_viewed: false,
            solution_viewed: false,
        }
    }
}

/// Per-session log of the latest answer per question plus hint/solution
/// flags. Only the owning session mutates it, and only while Active; the
/// state check itself lives one level up in `TestSession`.
#[derive(Debug, Default)]
pub struct AnswerLedger {
    records: HashMap<String, AnswerRecord>,
}

impl AnswerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerRecord> {
        self.records.get(question_id)
    }

    /// Number of questions with a selected option.
    pub fn answered_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.selected_option.is_some())
            .count()
    }

    /// Upserts the answer for a question.
    ///
    /// The question and option must exist in the session's bank snapshot,
    /// and the question must not be solution-locked.
    pub fn record_answer(
        &mut self,
        snapshot: &TestSnapshot,
        question_id: &str,
        option_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let question = snapshot
            .question(question_id)
            .ok_or_else(|| AppError::InvalidQuestionId(question_id.to_string()))?;

        if question.option(option_id).is_none() {
            return Err(AppError::BadRequest(format!(
                "Question '{}' has no option '{}'",
                question_id, option_id
            )));
        }

        let record = self
            .records
            .entry(question_id.to_string())
            .or_insert_with(|| AnswerRecord::new(now));

        if record.solution_viewed {
            return Err(AppError::AnswerLocked(question_id.to_string()));
        }

        record.selected_option = Some(option_id.to_string());
        record.updated_at = now;
        Ok(())
    }

    /// Merges a batch of answers, last write wins per question. Used by
    /// manual submission; a locked question rejects the whole merge.
    pub fn merge_answers(
        &mut self,
        snapshot: &TestSnapshot,
        answers: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        for (question_id, option_id) in answers {
            self.record_answer(snapshot, question_id, option_id, now)?;
        }
        Ok(())
    }

    /// Sets the hint-viewed flag. Idempotent; never affects marks.
    pub fn mark_hint_viewed(
        &mut self,
        snapshot: &TestSnapshot,
        question_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if snapshot.question(question_id).is_none() {
            return Err(AppError::InvalidQuestionId(question_id.to_string()));
        }
        self.records
            .entry(question_id.to_string())
            .or_insert_with(|| AnswerRecord::new(now))
            .hint_viewed = true;
        Ok(())
    }

    /// Sets the solution-viewed flag, locking the answer going forward.
    /// Idempotent.
    pub fn mark_solution_viewed(
        &mut self,
        snapshot: &TestSnapshot,
        question_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if snapshot.question(question_id).is_none() {
            return Err(AppError::InvalidQuestionId(question_id.to_string()));
        }
        self.records
            .entry(question_id.to_string())
            .or_insert_with(|| AnswerRecord::new(now))
            .solution_viewed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{ChoiceOption, Question};

    fn snapshot() -> TestSnapshot {
        TestSnapshot {
            test_id: 1,
            title: "Sample".to_string(),
            description: None,
            duration_seconds: None,
            questions: vec![Question {
                id: "q1".to_string(),
                text: "2 + 2 = ?".to_string(),
                options: vec![
                    ChoiceOption {
                        id: "A".to_string(),
                        text: "4".to_string(),
                    },
                    ChoiceOption {
                        id: "B".to_string(),
                        text: "5".to_string(),
                    },
                ],
                correct_option: "A".to_string(),
                marks: 4,
                negative_marks: -1,
                subject: None,
                topic: None,
                hint: None,
                explanation: None,
            }],
        }
    }

    #[test]
    fn record_answer_upserts() {
        let snap = snapshot();
        let mut ledger = AnswerLedger::new();
        let now = Utc::now();

        ledger.record_answer(&snap, "q1", "A", now).unwrap();
        ledger.record_answer(&snap, "q1", "B", now).unwrap();

        assert_eq!(
            ledger.get("q1").unwrap().selected_option.as_deref(),
            Some("B")
        );
        assert_eq!(ledger.answered_count(), 1);
    }

    #[test]
    fn record_answer_rejects_unknown_question() {
        let snap = snapshot();
        let mut ledger = AnswerLedger::new();

        let err = ledger
            .record_answer(&snap, "q99", "A", Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidQuestionId(_)));
    }

    #[test]
    fn record_answer_rejects_unknown_option() {
        let snap = snapshot();
        let mut ledger = AnswerLedger::new();

        let err = ledger
            .record_answer(&snap, "q1", "Z", Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn solution_view_locks_answer() {
        let snap = snapshot();
        let mut ledger = AnswerLedger::new();
        let now = Utc::now();

        ledger.record_answer(&snap, "q1", "B", now).unwrap();
        ledger.mark_solution_viewed(&snap, "q1", now).unwrap();

        let err = ledger.record_answer(&snap, "q1", "A", now).unwrap_err();
        assert!(matches!(err, AppError::AnswerLocked(_)));

        // The previously selected option survives the rejected write.
        assert_eq!(
            ledger.get("q1").unwrap().selected_option.as_deref(),
            Some("B")
        );
    }

    #[test]
    fn hint_view_does_not_lock() {
        let snap = snapshot();
        let mut ledger = AnswerLedger::new();
        let now = Utc::now();

        ledger.mark_hint_viewed(&snap, "q1", now).unwrap();
        ledger.record_answer(&snap, "q1", "A", now).unwrap();

        let record = ledger.get("q1").unwrap();
        assert!(record.hint_viewed);
        assert_eq!(record.selected_option.as_deref(), Some("A"));
    }

    #[test]
    fn merge_rejects_locked_question() {
        let snap = snapshot();
        let mut ledger = AnswerLedger::new();
        let now = Utc::now();

        ledger.mark_solution_viewed(&snap, "q1", now).unwrap();

        let mut answers = HashMap::new();
        answers.insert("q1".to_string(), "A".to_string());
        let err = ledger.merge_answers(&snap, &answers, now).unwrap_err();
        assert!(matches!(err, AppError::AnswerLocked(_)));
    }
}
