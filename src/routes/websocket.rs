use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{services::websocket_service, state::SharedState};

/// Query parameters accepted when opening the socket.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ConnectParams {
    /// Team the client belongs to; recorded on sessions it creates.
    pub team_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "rooms",
    params(ConnectParams),
    responses((status = 101, description = "Switching protocols to the quiz WebSocket"))
)]
/// Upgrade the HTTP connection into a quiz client socket.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let team_id = params.team_id.filter(|team| !team.trim().is_empty());
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, team_id))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
