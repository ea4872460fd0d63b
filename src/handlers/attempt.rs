// src/handlers/attempt.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{error::AppError, storage::AttemptStore, utils::jwt::Claims};

/// Lists the authenticated user's completed attempts, newest first.
pub async fn list_attempts(
    State(store): State<Arc<dyn AttemptStore>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let attempts = store.history(user_id).await?;
    Ok(Json(attempts))
}

/// Returns the full frozen score report of one attempt.
/// Another user's attempt is indistinguishable from a missing one.
pub async fn get_attempt(
    State(store): State<Arc<dyn AttemptStore>>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let attempt = store
        .fetch(attempt_id, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attempt {} not found", attempt_id)))?;
    Ok(Json(attempt))
}
