// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{attempt, session},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Merges the session-lifecycle and attempt-report sub-routers.
/// * Every route requires a caller-supplied identity (Bearer token).
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let session_routes = Router::new()
        .route("/tests/{test_id}/session", post(session::start_session))
        .route("/sessions/{session_id}", get(session::session_status))
        .route("/sessions/{session_id}/answer", post(session::record_answer))
        .route("/sessions/{session_id}/hint", post(session::request_hint))
        .route(
            "/sessions/{session_id}/solution",
            post(session::request_solution),
        )
        .route("/sessions/{session_id}/submit", post(session::submit_session));

    let attempt_routes = Router::new()
        .route("/attempts", get(attempt::list_attempts))
        .route("/attempts/{attempt_id}", get(attempt::get_attempt));

    Router::new()
        .nest(
            "/api",
            session_routes
                .merge(attempt_routes)
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
