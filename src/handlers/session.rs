// src/handlers/session.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{QuestionRef, RecordAnswerRequest, StartSessionRequest, SubmitSessionRequest},
        question::PublicQuestion,
        report::ScoreReport,
    },
    session::SessionRegistry,
    utils::jwt::Claims,
};

/// DTO returned by `start_session`. Questions are the answerless public
/// projection; the correct options stay server-side for the whole attempt.
#[derive(Debug, Serialize)]
struct StartSessionResponse {
    session_id: Uuid,
    test_id: i64,
    title: String,
    description: Option<String>,
    questions: Vec<PublicQuestion>,
    started_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

/// Starts a timed attempt for the authenticated user.
///
/// * Captures a question-bank snapshot for the lifetime of the session.
/// * Rejects a second start while an attempt for the same test is active.
/// * Registers the deadline with the expiry scheduler when timed.
pub async fn start_session(
    State(sessions): State<Arc<SessionRegistry>>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;
    let started = sessions
        .start(test_id, user_id, payload.duration_override_secs)
        .await?;

    let response = StartSessionResponse {
        session_id: started.session_id,
        test_id: started.snapshot.test_id,
        title: started.snapshot.title.clone(),
        description: started.snapshot.description.clone(),
        questions: started
            .snapshot
            .questions
            .iter()
            .map(PublicQuestion::from)
            .collect(),
        started_at: started.started_at,
        expires_at: started.expires_at,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// Returns the session's state, timing and progress.
pub async fn session_status(
    State(sessions): State<Arc<SessionRegistry>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let status = sessions.status(session_id, user_id).await?;
    Ok(Json(status))
}

/// Upserts the user's answer for one question.
pub async fn record_answer(
    State(sessions): State<Arc<SessionRegistry>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;
    sessions
        .record_answer(session_id, user_id, &payload.question_id, &payload.option_id)
        .await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Reveals a question's hint. Hint usage is recorded for analytics but
/// never affects marks.
pub async fn request_hint(
    State(sessions): State<Arc<SessionRegistry>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<QuestionRef>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;
    let hint = sessions
        .reveal_hint(session_id, user_id, &payload.question_id)
        .await?;

    Ok(Json(serde_json::json!({
        "question_id": payload.question_id,
        "hint": hint,
    })))
}

/// Reveals a question's solution, locking its answer for the rest of the
/// session.
pub async fn request_solution(
    State(sessions): State<Arc<SessionRegistry>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<QuestionRef>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;
    let reveal = sessions
        .reveal_solution(session_id, user_id, &payload.question_id)
        .await?;

    Ok(Json(reveal))
}

/// Submits the session and returns its score report.
///
/// Safe to call any number of times, and safe to race against the expiry
/// scheduler: whoever performs the freeze scores once, everyone else gets
/// the same report back.
pub async fn submit_session(
    State(sessions): State<Arc<SessionRegistry>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<SubmitSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let report = sessions
        .submit(session_id, user_id, payload.answers.as_ref())
        .await?;

    Ok(Json(ScoreReport::clone(&report)))
}
