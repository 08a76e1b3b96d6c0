use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::solo::{
        SoloAnswerRequest, SoloAnswerResponse, SoloFinishResponse, SoloStartRequest,
        SoloStartResponse,
    },
    error::AppError,
    services::solo_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/solo/sessions",
    tag = "solo",
    request_body = SoloStartRequest,
    responses(
        (status = 200, description = "Solo session opened", body = SoloStartResponse),
        (status = 400, description = "Invalid request or unplayable quiz"),
        (status = 404, description = "Unknown quiz"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Start a single-player run.
pub async fn start(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SoloStartRequest>>,
) -> Result<Json<SoloStartResponse>, AppError> {
    Ok(Json(solo_service::start(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/solo/sessions/{session_id}/answers",
    tag = "solo",
    params(("session_id" = Uuid, Path, description = "Solo session identifier")),
    request_body = SoloAnswerRequest,
    responses(
        (status = 200, description = "Answer graded", body = SoloAnswerResponse),
        (status = 404, description = "Unknown solo session"),
        (status = 409, description = "Question already answered")
    )
)]
/// Answer one question of a solo run.
pub async fn answer(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SoloAnswerRequest>>,
) -> Result<Json<SoloAnswerResponse>, AppError> {
    Ok(Json(solo_service::answer(&state, session_id, payload).await?))
}

#[utoipa::path(
    post,
    path = "/solo/sessions/{session_id}/finish",
    tag = "solo",
    params(("session_id" = Uuid, Path, description = "Solo session identifier")),
    responses(
        (status = 200, description = "Solo run completed", body = SoloFinishResponse),
        (status = 404, description = "Unknown solo session")
    )
)]
/// Finish a solo run and store its result.
pub async fn finish(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SoloFinishResponse>, AppError> {
    Ok(Json(solo_service::finish(&state, session_id).await?))
}

/// Configure the solo-mode routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/solo/sessions", post(start))
        .route("/solo/sessions/{session_id}/answers", post(answer))
        .route("/solo/sessions/{session_id}/finish", post(finish))
}
