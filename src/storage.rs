// src/storage.rs

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::attempt::{AttemptSummary, FrozenAttempt, StoredAttempt, TerminationReason};
use crate::models::report::ScoreReport;

/// Collaborator receiving frozen attempts for durable storage, and serving
/// them back to the report endpoints. The session registry never mutates
/// an attempt after handing it off.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn persist(&self, attempt: &FrozenAttempt) -> Result<(), AppError>;
    async fn fetch(&self, attempt_id: Uuid, user_id: i64)
    -> Result<Option<StoredAttempt>, AppError>;
    async fn history(&self, user_id: i64) -> Result<Vec<AttemptSummary>, AppError>;
}

#[derive(FromRow)]
struct AttemptRow {
    id: String,
    test_id: i64,
    started_at: chrono::DateTime<chrono::Utc>,
    completed_at: chrono::DateTime<chrono::Utc>,
    termination: String,
    report: String,
}

#[derive(FromRow)]
struct SummaryRow {
    id: String,
    test_id: i64,
    started_at: chrono::DateTime<chrono::Utc>,
    completed_at: chrono::DateTime<chrono::Utc>,
    termination: String,
    total_score: i64,
    max_score: i64,
    percentage: f64,
}

/// Attempt store backed by the `test_attempts` table. The full report is
/// serialized once at freeze time and returned verbatim afterwards.
pub struct SqliteAttemptStore {
    pool: SqlitePool,
}

impl SqliteAttemptStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for SqliteAttemptStore {
    async fn persist(&self, attempt: &FrozenAttempt) -> Result<(), AppError> {
        let report_json = serde_json::to_string(attempt.report.as_ref())
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO test_attempts
                (id, test_id, user_id, started_at, completed_at, termination,
                 total_score, max_score, percentage, report)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.attempt_id.to_string())
        .bind(attempt.test_id)
        .bind(attempt.user_id)
        .bind(attempt.started_at)
        .bind(attempt.completed_at)
        .bind(attempt.termination.as_str())
        .bind(attempt.report.total_score)
        .bind(attempt.report.max_score)
        .bind(attempt.report.percentage)
        .bind(report_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch(
        &self,
        attempt_id: Uuid,
        user_id: i64,
    ) -> Result<Option<StoredAttempt>, AppError> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT id, test_id, started_at, completed_at, termination, report
            FROM test_attempts
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(attempt_id.to_string())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let report: ScoreReport = serde_json::from_str(&row.report).map_err(|e| {
            tracing::error!("Stored report for attempt {} is unreadable: {}", row.id, e);
            AppError::InternalServerError(format!("Stored report for attempt {} is unreadable", row.id))
        })?;

        Ok(Some(StoredAttempt {
            attempt_id: parse_attempt_id(&row.id)?,
            test_id: row.test_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            termination: parse_termination(&row.id, &row.termination)?,
            report,
        }))
    }

    async fn history(&self, user_id: i64) -> Result<Vec<AttemptSummary>, AppError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT id, test_id, started_at, completed_at, termination,
                   total_score, max_score, percentage
            FROM test_attempts
            WHERE user_id = ?
            ORDER BY completed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AttemptSummary {
                    attempt_id: parse_attempt_id(&row.id)?,
                    test_id: row.test_id,
                    started_at: row.started_at,
                    completed_at: row.completed_at,
                    termination: parse_termination(&row.id, &row.termination)?,
                    total_score: row.total_score as i32,
                    max_score: row.max_score as i32,
                    percentage: row.percentage,
                })
            })
            .collect()
    }
}

fn parse_attempt_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|_| AppError::InternalServerError(format!("Invalid attempt id in storage: {}", raw)))
}

fn parse_termination(attempt_id: &str, raw: &str) -> Result<TerminationReason, AppError> {
    TerminationReason::parse(raw).ok_or_else(|| {
        AppError::InternalServerError(format!(
            "Invalid termination reason '{}' for attempt {}",
            raw, attempt_id
        ))
    })
}
