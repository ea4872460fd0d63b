// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use uuid::Uuid;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
///
/// The session-lifecycle variants are all local, recoverable conditions:
/// they carry enough context for the caller to display a message and none
/// of them is fatal to the process.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 404 - unknown session id, or a session the caller does not own
    SessionNotFound(Uuid),

    // 409 - the (user, test) pair already has an active session
    DuplicateActiveSession { test_id: i64 },

    // 409 - write attempted on a session that already left Active
    SessionNotActive(Uuid),

    // 404 - question id outside the session's bank snapshot
    InvalidQuestionId(String),

    // 409 - answer change attempted after the solution was revealed
    AnswerLocked(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Session {} not found", id))
            }
            AppError::DuplicateActiveSession { test_id } => (
                StatusCode::CONFLICT,
                format!("An attempt for test {} is already in progress", test_id),
            ),
            AppError::SessionNotActive(id) => (
                StatusCode::CONFLICT,
                format!("Session {} is no longer active", id),
            ),
            AppError::InvalidQuestionId(question_id) => (
                StatusCode::NOT_FOUND,
                format!("Question '{}' is not part of this test", question_id),
            ),
            AppError::AnswerLocked(question_id) => (
                StatusCode::CONFLICT,
                format!(
                    "The answer for question '{}' is locked because its solution was viewed",
                    question_id
                ),
            ),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
