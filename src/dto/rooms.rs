use serde::Serialize;
use utoipa::ToSchema;

use crate::state::{room::Room, state_machine::RoomPhase};

/// Public view of a room, enough for a join page to validate a code.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: u32,
    pub game_state: RoomPhase,
    pub player_count: usize,
    pub capacity: usize,
    /// Whether a new player can still join.
    pub joinable: bool,
}

impl From<&Room> for RoomSummary {
    fn from(room: &Room) -> Self {
        let phase = room.phase();
        Self {
            room_id: room.join_code(),
            game_state: phase,
            player_count: room.player_count(),
            capacity: room.capacity(),
            joinable: phase != RoomPhase::End && room.participants().count() < room.capacity(),
        }
    }
}
