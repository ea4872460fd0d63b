// src/scoring.rs

use std::collections::BTreeMap;

use crate::models::report::{AnswerOutcome, GroupScore, QuestionOutcome, ScoreReport};
use crate::models::test::TestSnapshot;
use crate::session::ledger::AnswerLedger;

/// Bucket for questions carrying no subject/topic tag.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Scores a frozen attempt.
///
/// Pure function of the bank snapshot and the ledger: identical inputs
/// always produce an identical report, which is what makes the session
/// manager's idempotent submission safe to call twice. Unattempted
/// questions score 0, correct answers award `marks`, wrong answers award
/// `negative_marks` (signed). Hint/solution usage is carried through for
/// analytics and never alters marks.
pub fn score(snapshot: &TestSnapshot, ledger: &AnswerLedger) -> ScoreReport {
    let mut total_score = 0;
    let mut max_score = 0;
    let mut questions = Vec::with_capacity(snapshot.questions.len());
    let mut subjects: BTreeMap<String, GroupScore> = BTreeMap::new();
    let mut topics: BTreeMap<String, GroupScore> = BTreeMap::new();

    for question in &snapshot.questions {
        let record = ledger.get(&question.id);
        let selected = record.and_then(|r| r.selected_option.clone());

        let (outcome, marks_awarded) = match selected.as_deref() {
            None => (AnswerOutcome::Unattempted, 0),
            Some(option) if option == question.correct_option => {
                (AnswerOutcome::Correct, question.marks)
            }
            Some(_) => (AnswerOutcome::Incorrect, question.negative_marks),
        };

        total_score += marks_awarded;
        max_score += question.marks;

        let subject_key = question.subject.as_deref().unwrap_or(UNCATEGORIZED);
        let topic_key = question.topic.as_deref().unwrap_or(UNCATEGORIZED);
        tally(
            subjects.entry(subject_key.to_string()).or_default(),
            outcome,
            marks_awarded,
            question.marks,
        );
        tally(
            topics.entry(topic_key.to_string()).or_default(),
            outcome,
            marks_awarded,
            question.marks,
        );

        questions.push(QuestionOutcome {
            question_id: question.id.clone(),
            selected_option: selected,
            correct_option: question.correct_option.clone(),
            outcome,
            marks_awarded,
            subject: question.subject.clone(),
            topic: question.topic.clone(),
            hint_viewed: record.map(|r| r.hint_viewed).unwrap_or(false),
            solution_viewed: record.map(|r| r.solution_viewed).unwrap_or(false),
        });
    }

    for group in subjects.values_mut().chain(topics.values_mut()) {
        group.percentage = percentage(group.score, group.max_score);
    }

    ScoreReport {
        total_score,
        max_score,
        percentage: percentage(total_score, max_score),
        questions,
        subjects,
        topics,
    }
}

/// Percentage clamped to [0, 100]: a negative total reports as 0% rather
/// than a confusing negative percentage, and an empty bank scores 0%.
fn percentage(score: i32, max_score: i32) -> f64 {
    if max_score > 0 {
        (score.max(0) as f64 / max_score as f64) * 100.0
    } else {
        0.0
    }
}

fn tally(group: &mut GroupScore, outcome: AnswerOutcome, marks_awarded: i32, marks: i32) {
    group.total_questions += 1;
    group.score += marks_awarded;
    group.max_score += marks;
    match outcome {
        AnswerOutcome::Correct => group.correct += 1,
        AnswerOutcome::Incorrect => group.incorrect += 1,
        AnswerOutcome::Unattempted => group.unattempted += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{ChoiceOption, Question};
    use chrono::Utc;

    fn question(id: &str, subject: Option<&str>, topic: Option<&str>) -> Question {
        Question {
            id: id.to_string(),
            text: format!("Question {}", id),
            options: vec![
                ChoiceOption {
                    id: "A".to_string(),
                    text: "first".to_string(),
                },
                ChoiceOption {
                    id: "B".to_string(),
                    text: "second".to_string(),
                },
            ],
            correct_option: "A".to_string(),
            marks: 4,
            negative_marks: -1,
            subject: subject.map(str::to_string),
            topic: topic.map(str::to_string),
            hint: None,
            explanation: None,
        }
    }

    fn snapshot(questions: Vec<Question>) -> TestSnapshot {
        TestSnapshot {
            test_id: 1,
            title: "Sample".to_string(),
            description: None,
            duration_seconds: None,
            questions,
        }
    }

    #[test]
    fn one_correct_one_unattempted() {
        let snap = snapshot(vec![
            question("q1", Some("Maths"), Some("Algebra")),
            question("q2", Some("Maths"), Some("Geometry")),
        ]);
        let mut ledger = AnswerLedger::new();
        ledger.record_answer(&snap, "q1", "A", Utc::now()).unwrap();

        let report = score(&snap, &ledger);

        assert_eq!(report.total_score, 4);
        assert_eq!(report.max_score, 8);
        assert_eq!(report.percentage, 50.0);
        assert_eq!(report.questions[0].outcome, AnswerOutcome::Correct);
        assert_eq!(report.questions[1].outcome, AnswerOutcome::Unattempted);
        assert_eq!(report.questions[1].marks_awarded, 0);
    }

    #[test]
    fn one_incorrect_one_correct() {
        let snap = snapshot(vec![question("q1", None, None), question("q2", None, None)]);
        let mut ledger = AnswerLedger::new();
        ledger.record_answer(&snap, "q1", "B", Utc::now()).unwrap();
        ledger.record_answer(&snap, "q2", "A", Utc::now()).unwrap();

        let report = score(&snap, &ledger);

        assert_eq!(report.total_score, 3);
        assert_eq!(report.max_score, 8);
        assert_eq!(report.percentage, 37.5);
    }

    #[test]
    fn negative_total_clamps_percentage() {
        let snap = snapshot(vec![question("q1", None, None)]);
        let mut ledger = AnswerLedger::new();
        ledger.record_answer(&snap, "q1", "B", Utc::now()).unwrap();

        let report = score(&snap, &ledger);

        assert_eq!(report.total_score, -1);
        assert_eq!(report.percentage, 0.0);
    }

    #[test]
    fn empty_bank_scores_zero_percent() {
        let snap = snapshot(vec![]);
        let report = score(&snap, &AnswerLedger::new());

        assert_eq!(report.total_score, 0);
        assert_eq!(report.max_score, 0);
        assert_eq!(report.percentage, 0.0);
    }

    #[test]
    fn untagged_questions_group_under_uncategorized() {
        let snap = snapshot(vec![
            question("q1", Some("Physics"), None),
            question("q2", None, None),
        ]);
        let mut ledger = AnswerLedger::new();
        ledger.record_answer(&snap, "q1", "A", Utc::now()).unwrap();
        ledger.record_answer(&snap, "q2", "A", Utc::now()).unwrap();

        let report = score(&snap, &ledger);

        assert_eq!(report.subjects["Physics"].score, 4);
        assert_eq!(report.subjects[UNCATEGORIZED].score, 4);
        assert_eq!(report.topics[UNCATEGORIZED].total_questions, 2);
    }

    #[test]
    fn subject_aggregates_add_up() {
        let snap = snapshot(vec![
            question("q1", Some("Maths"), Some("Algebra")),
            question("q2", Some("Maths"), Some("Algebra")),
            question("q3", Some("Physics"), Some("Optics")),
        ]);
        let mut ledger = AnswerLedger::new();
        ledger.record_answer(&snap, "q1", "A", Utc::now()).unwrap();
        ledger.record_answer(&snap, "q2", "B", Utc::now()).unwrap();

        let report = score(&snap, &ledger);

        let maths = &report.subjects["Maths"];
        assert_eq!(maths.score, 3);
        assert_eq!(maths.max_score, 8);
        assert_eq!(maths.correct, 1);
        assert_eq!(maths.incorrect, 1);
        assert_eq!(report.subjects["Physics"].unattempted, 1);
        assert_eq!(report.percentage, 25.0);
    }

    #[test]
    fn hint_usage_does_not_change_marks() {
        let snap = snapshot(vec![question("q1", None, None)]);
        let mut ledger = AnswerLedger::new();
        ledger.mark_hint_viewed(&snap, "q1", Utc::now()).unwrap();
        ledger.record_answer(&snap, "q1", "A", Utc::now()).unwrap();

        let report = score(&snap, &ledger);

        assert_eq!(report.total_score, 4);
        assert!(report.questions[0].hint_viewed);
    }

    #[test]
    fn scoring_is_deterministic() {
        let snap = snapshot(vec![
            question("q1", Some("Maths"), Some("Algebra")),
            question("q2", None, Some("Optics")),
        ]);
        let mut ledger = AnswerLedger::new();
        ledger.record_answer(&snap, "q1", "A", Utc::now()).unwrap();
        ledger.record_answer(&snap, "q2", "B", Utc::now()).unwrap();

        let first = serde_json::to_string(&score(&snap, &ledger)).unwrap();
        let second = serde_json::to_string(&score(&snap, &ledger)).unwrap();
        assert_eq!(first, second);
    }
}
