use tracing::debug;

use crate::{
    dto::ws::{CloseReason, RoomStateView, ServerMessage},
    state::{
        ConnectionHub, ConnectionId,
        room::{Role, Room},
    },
};

/// Push a personalized snapshot to every online participant.
///
/// `host_error` is attached to the host's copy only. Offline participants are
/// skipped; they resync by rejoining.
pub fn room_state(hub: &ConnectionHub, room: &Room, host_error: Option<&str>) {
    let mut delivered = 0usize;
    for participant in room.participants().filter(|p| p.is_online) {
        let Some(connection_id) = participant.connection_id else {
            continue;
        };
        let error = host_error
            .filter(|_| participant.role == Role::Host)
            .map(str::to_owned);
        let view = RoomStateView::for_recipient(room, &participant.user_id, error);
        if hub.send(connection_id, &ServerMessage::RoomState(view)) {
            delivered += 1;
        }
    }
    debug!(join_code = room.join_code(), delivered, "room state broadcast");
}

/// Targeted snapshot for a single participant, leaving the rest of the room untouched.
pub fn room_state_to(hub: &ConnectionHub, room: &Room, user_id: &str) -> bool {
    let Some(connection_id) = room.participant(user_id).and_then(|p| p.connection_id) else {
        return false;
    };
    let view = RoomStateView::for_recipient(room, user_id, None);
    hub.send(connection_id, &ServerMessage::RoomState(view))
}

/// Reject a request, answering only the connection that sent it.
pub fn error_to(hub: &ConnectionHub, connection_id: ConnectionId, message: impl Into<String>) {
    hub.send(connection_id, &ServerMessage::error(message));
}

/// Durability warning for the host of `room`.
pub fn host_warning(hub: &ConnectionHub, room: &Room, message: impl Into<String>) {
    let host = room
        .participant(room.host_id())
        .and_then(|host| host.connection_id.filter(|_| host.is_online));
    match host {
        Some(connection_id) => {
            hub.send(connection_id, &ServerMessage::warning(message));
        }
        None => debug!(join_code = room.join_code(), "host offline, warning not delivered"),
    }
}

/// Tell every online participant that the room is gone.
pub fn room_closed(hub: &ConnectionHub, room: &Room, reason: CloseReason) {
    let frame = ServerMessage::closed(reason);
    for connection_id in room
        .participants()
        .filter(|p| p.is_online)
        .filter_map(|p| p.connection_id)
    {
        hub.send(connection_id, &frame);
    }
}
