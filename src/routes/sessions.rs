use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{feedback::FeedbackRequest, results::SessionResults},
    error::AppError,
    services::{feedback_service, results_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sessions/{session_id}/results",
    tag = "sessions",
    params(("session_id" = Uuid, Path, description = "Game session identifier")),
    responses(
        (status = 200, description = "Final standings and per-question breakdown", body = SessionResults),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Session has not finished yet"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Results of a finished session.
pub async fn get_results(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResults>, AppError> {
    Ok(Json(results_service::load_results(&state, session_id).await?))
}

#[utoipa::path(
    post,
    path = "/sessions/{session_id}/feedback",
    tag = "sessions",
    params(("session_id" = Uuid, Path, description = "Game session identifier")),
    request_body = FeedbackRequest,
    responses(
        (status = 204, description = "Feedback recorded"),
        (status = 400, description = "Rating or comment out of bounds"),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Session has not finished yet")
    )
)]
/// Rate a finished session.
pub async fn post_feedback(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<FeedbackRequest>>,
) -> Result<StatusCode, AppError> {
    feedback_service::submit_feedback(&state, session_id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Configure the session routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions/{session_id}/results", get(get_results))
        .route("/sessions/{session_id}/feedback", post(post_feedback))
}
