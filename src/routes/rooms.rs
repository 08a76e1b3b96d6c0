use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::rooms::RoomSummary,
    error::{AppError, ServiceError},
    services::room_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/rooms/{join_code}",
    tag = "rooms",
    params(("join_code" = u32, Path, description = "Room join code")),
    responses(
        (status = 200, description = "Room summary", body = RoomSummary),
        (status = 404, description = "No room uses this code")
    )
)]
/// Look up a room by join code without joining it.
pub async fn get_room(
    State(state): State<SharedState>,
    Path(join_code): Path<u32>,
) -> Result<Json<RoomSummary>, AppError> {
    let summary = room_service::room_summary(&state, join_code)
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(summary))
}

/// Configure the room lookup routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{join_code}", get(get_room))
}
