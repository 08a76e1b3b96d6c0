use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::models::JoinCode,
    dto::ws::ClientMessage,
    services::{
        broadcast,
        room_actor::RoomCommand,
        room_service::{self, NewRoom},
    },
    state::{ConnectionId, SharedState, connections::ClientConnection, room::RoomError},
};

/// Handle the full lifecycle of one quiz client socket.
pub async fn handle_socket(state: SharedState, socket: WebSocket, team_id: Option<String>) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound frames flowing while we await inbound ones.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4();
    state.connections().register(ClientConnection {
        id: connection_id,
        team_id: team_id.clone(),
        tx: outbound_tx.clone(),
    });
    info!(connection_id = %connection_id, team_id = ?team_id, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => handle_text(&state, connection_id, text.as_str()).await,
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                debug!(connection_id = %connection_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    handle_disconnect(&state, connection_id).await;
    state.connections().unregister(connection_id);
    info!(connection_id = %connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Parse, validate and dispatch one text frame; failures answer the sender only.
pub async fn handle_text(state: &SharedState, connection_id: ConnectionId, text: &str) {
    match ClientMessage::from_json_str(text) {
        Ok(message) => handle_message(state, connection_id, message).await,
        Err(err) => {
            debug!(connection_id = %connection_id, error = %err, "rejected inbound frame");
            broadcast::error_to(
                state.connections(),
                connection_id,
                "Invalid message. Please refresh and try again.",
            );
        }
    }
}

/// Dispatch a validated event and report a rejection to its sender.
pub async fn handle_message(state: &SharedState, connection_id: ConnectionId, message: ClientMessage) {
    let for_host = matches!(message, ClientMessage::CreateRoom { .. });
    if let Err(err) = dispatch(state, connection_id, message).await {
        debug!(connection_id = %connection_id, error = %err, "client event rejected");
        broadcast::error_to(state.connections(), connection_id, err.user_message(for_host));
    }
}

/// Map a client event onto its room.
///
/// Only `create-room` and `join-room` work on an unbound connection; every other
/// event must target the room the connection joined.
pub async fn dispatch(
    state: &SharedState,
    connection_id: ConnectionId,
    message: ClientMessage,
) -> Result<(), RoomError> {
    match message {
        ClientMessage::CreateRoom {
            quiz_id,
            host_id,
            host_name,
            settings,
        } => {
            ensure_unbound(state, connection_id, None)?;
            let join_code = room_service::create_room(
                state,
                connection_id,
                NewRoom {
                    quiz_id,
                    host_id,
                    host_name,
                    settings,
                },
            )
            .await?;
            info!(connection_id = %connection_id, join_code, "room opened");
            Ok(())
        }
        ClientMessage::JoinRoom {
            room_id,
            user_id,
            username,
            guest,
        } => {
            ensure_unbound(state, connection_id, Some(room_id))?;
            let handle = room_service::route(state, room_id).await?;
            handle
                .send(RoomCommand::Join {
                    connection_id,
                    user_id,
                    display_name: username.trim().to_owned(),
                    guest,
                })
                .await
        }
        ClientMessage::StartGame { room_id } => {
            send_to_room(state, connection_id, room_id, RoomCommand::StartGame { connection_id }).await
        }
        ClientMessage::SubmitAnswer {
            room_id,
            user_id,
            option_index,
        } => {
            send_to_room(
                state,
                connection_id,
                room_id,
                RoomCommand::SubmitAnswer {
                    connection_id,
                    user_id,
                    option_index,
                },
            )
            .await
        }
        ClientMessage::RequestNextQuestion { room_id } => {
            send_to_room(
                state,
                connection_id,
                room_id,
                RoomCommand::NextQuestion { connection_id },
            )
            .await
        }
        ClientMessage::UpdateSettings { room_id, settings } => {
            send_to_room(
                state,
                connection_id,
                room_id,
                RoomCommand::UpdateSettings {
                    connection_id,
                    patch: settings,
                },
            )
            .await
        }
        ClientMessage::PlayAgain { room_id } => {
            send_to_room(state, connection_id, room_id, RoomCommand::PlayAgain { connection_id }).await
        }
        ClientMessage::CloseRoom { room_id } => {
            send_to_room(state, connection_id, room_id, RoomCommand::CloseRoom { connection_id }).await
        }
    }
}

/// Tell the room behind `connection_id`, if any, that the socket is gone.
pub async fn handle_disconnect(state: &SharedState, connection_id: ConnectionId) {
    let Some((join_code, handle)) = state.rooms().find_room_by_connection(connection_id) else {
        return;
    };
    if handle
        .send(RoomCommand::Disconnect { connection_id })
        .await
        .is_err()
    {
        debug!(connection_id = %connection_id, join_code, "room already stopped");
        state.rooms().unbind_connection(connection_id, join_code);
    }
}

fn ensure_unbound(
    state: &SharedState,
    connection_id: ConnectionId,
    target: Option<JoinCode>,
) -> Result<(), RoomError> {
    match state.rooms().find_room_by_connection(connection_id) {
        Some((join_code, _)) if Some(join_code) != target => Err(RoomError::AlreadyInRoom),
        _ => Ok(()),
    }
}

async fn send_to_room(
    state: &SharedState,
    connection_id: ConnectionId,
    room_id: JoinCode,
    command: RoomCommand,
) -> Result<(), RoomError> {
    match state.rooms().find_room_by_connection(connection_id) {
        Some((join_code, handle)) if join_code == room_id => handle.send(command).await,
        Some(_) => Err(RoomError::AlreadyInRoom),
        None => Err(RoomError::NotInRoom),
    }
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
