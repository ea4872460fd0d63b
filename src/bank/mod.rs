// src/bank/mod.rs

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

use crate::error::AppError;
use crate::models::question::Question;
use crate::models::test::TestSnapshot;
use crate::utils::html::clean_html;

/// Read-only collaborator supplying question banks.
///
/// The snapshot returned here is captured once per session and shared by
/// reference afterwards; later bank edits never reach an in-flight attempt.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    async fn snapshot(&self, test_id: i64) -> Result<TestSnapshot, AppError>;
}

/// Row shape of the `tests` table.
#[derive(FromRow)]
struct TestRow {
    id: i64,
    title: String,
    description: Option<String>,
    duration_seconds: Option<i64>,
    questions: String,
}

/// Question bank backed by the `tests` table, where the extraction
/// pipeline deposits each test's questions as a JSON document.
pub struct SqliteQuestionBank {
    pool: SqlitePool,
}

impl SqliteQuestionBank {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionBank for SqliteQuestionBank {
    async fn snapshot(&self, test_id: i64) -> Result<TestSnapshot, AppError> {
        let row = sqlx::query_as::<_, TestRow>(
            "SELECT id, title, description, duration_seconds, questions FROM tests WHERE id = ?",
        )
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Test {} not found", test_id)))?;

        let questions: Vec<Question> = serde_json::from_str(&row.questions).map_err(|e| {
            tracing::error!("Test {} has a malformed question bank: {}", test_id, e);
            AppError::InternalServerError(format!("Test {} has a malformed question bank", test_id))
        })?;
        let questions: Vec<Question> = questions.into_iter().map(sanitize_question).collect();
        validate_questions(test_id, &questions)?;

        let duration_seconds = match row.duration_seconds {
            Some(secs) if secs > 0 => Some(secs as u32),
            _ => None,
        };

        Ok(TestSnapshot {
            test_id: row.id,
            title: row.title,
            description: row.description,
            duration_seconds,
            questions,
        })
    }
}

/// Strips unsafe markup from every text field of a question. The bank is
/// the only place untrusted extraction output enters the system.
fn sanitize_question(mut q: Question) -> Question {
    q.text = clean_html(&q.text);
    for option in &mut q.options {
        option.text = clean_html(&option.text);
    }
    q.hint = q.hint.map(|h| clean_html(&h));
    q.explanation = q.explanation.map(|e| clean_html(&e));
    q
}

/// Schema validation at the bank boundary: nothing untyped or inconsistent
/// may reach the scoring path.
fn validate_questions(test_id: i64, questions: &[Question]) -> Result<(), AppError> {
    let mut seen = std::collections::HashSet::new();
    for q in questions {
        if q.id.is_empty() || q.text.is_empty() {
            return Err(malformed(test_id, "question with empty id or text"));
        }
        if !seen.insert(q.id.as_str()) {
            return Err(malformed(test_id, "duplicate question id"));
        }
        if q.options.len() < 2 {
            return Err(malformed(test_id, "question with fewer than two options"));
        }
        let mut option_ids = std::collections::HashSet::new();
        for option in &q.options {
            if option.id.is_empty() || !option_ids.insert(option.id.as_str()) {
                return Err(malformed(test_id, "empty or duplicate option id"));
            }
        }
        if q.option(&q.correct_option).is_none() {
            return Err(malformed(test_id, "correct option missing from options"));
        }
        if q.marks <= 0 {
            return Err(malformed(test_id, "non-positive marks"));
        }
        if q.negative_marks > 0 {
            return Err(malformed(test_id, "positive negative_marks"));
        }
    }
    Ok(())
}

fn malformed(test_id: i64, detail: &str) -> AppError {
    tracing::error!("Rejecting question bank for test {}: {}", test_id, detail);
    AppError::InternalServerError(format!("Test {} has a malformed question bank", test_id))
}
