use rand::Rng;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    dao::models::{JoinCode, SessionEntity},
    dto::rooms::RoomSummary,
    services::room_actor::{MAILBOX_CAPACITY, RoomActor, RoomCommand, Startup},
    state::{
        ConnectionId, RoomHandle, RoomLookup, SharedState,
        room::{HostSeat, Room, RoomError, RoomSettings, SettingsPatch},
    },
};

const MAX_CODE_ATTEMPTS: usize = 32;

/// Host request to open a room.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub quiz_id: String,
    pub host_id: String,
    pub host_name: String,
    pub settings: SettingsPatch,
}

/// Open a room for `connection_id` as host and return its join code.
///
/// The durable session is stored before the room accepts any command, so a
/// join code always resolves to a session record.
pub async fn create_room(
    state: &SharedState,
    connection_id: ConnectionId,
    request: NewRoom,
) -> Result<JoinCode, RoomError> {
    let backend = state
        .require_backend()
        .await
        .map_err(|_| RoomError::StorageUnavailable)?;

    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let join_code = reserve_code(state, &tx).await?;
    let session_id = Uuid::new_v4();
    let team_id = state.connections().team_hint(connection_id);

    let session = SessionEntity::multiplayer(
        session_id,
        request.quiz_id.clone(),
        request.host_id.clone(),
        join_code,
        team_id.clone(),
    );
    if let Err(err) = backend.sessions.create_session(session).await {
        state.rooms().discard(join_code);
        error!(join_code, error = %err, "failed to store session; room not created");
        return Err(RoomError::StorageUnavailable);
    }

    let mut settings = RoomSettings::default();
    settings.apply(request.settings);
    let room = Room::new(
        join_code,
        session_id,
        request.quiz_id,
        HostSeat {
            connection_id,
            user_id: request.host_id,
            display_name: request.host_name,
        },
        settings,
        team_id,
        state.config().max_participants,
    );

    state.rooms().bind_connection(connection_id, join_code);
    RoomActor::spawn(state.clone(), room, rx, tx.downgrade(), Startup::Fresh);
    Ok(join_code)
}

/// Pick an unused code and register `tx` under it.
async fn reserve_code(
    state: &SharedState,
    tx: &mpsc::Sender<RoomCommand>,
) -> Result<JoinCode, RoomError> {
    let range = state.config().join_code_range();
    for _ in 0..MAX_CODE_ATTEMPTS {
        let candidate = rand::rng().random_range(range.clone());
        // A code only known to the shared cache may be live on another node.
        if !matches!(state.rooms().get_room(candidate).await, RoomLookup::NotFound) {
            continue;
        }
        if state
            .rooms()
            .create_room(RoomHandle::new(candidate, tx.clone()))
            .is_ok()
        {
            return Ok(candidate);
        }
    }
    Err(RoomError::NoFreeCode)
}

/// Handle of the live room behind `join_code`, reviving it from the cache if needed.
pub async fn route(state: &SharedState, join_code: JoinCode) -> Result<RoomHandle, RoomError> {
    match state.rooms().get_room(join_code).await {
        RoomLookup::Live(handle) => Ok(handle),
        RoomLookup::Cached(room) => revive(state, *room),
        RoomLookup::NotFound => Err(RoomError::NotFound),
    }
}

fn revive(state: &SharedState, mut room: Room) -> Result<RoomHandle, RoomError> {
    let join_code = room.join_code();
    room.mark_all_offline();

    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let handle = RoomHandle::new(join_code, tx.clone());
    match state.rooms().create_room(handle.clone()) {
        Ok(()) => {
            info!(join_code, "reviving room from cache");
            RoomActor::spawn(state.clone(), room, rx, tx.downgrade(), Startup::Revived);
            Ok(handle)
        }
        // Another request revived it first.
        Err(_) => state.rooms().live(join_code).ok_or(RoomError::NotFound),
    }
}

/// Public summary of a room without reviving it.
pub async fn room_summary(
    state: &SharedState,
    join_code: JoinCode,
) -> Result<RoomSummary, RoomError> {
    match state.rooms().get_room(join_code).await {
        RoomLookup::Live(handle) => {
            let room = handle.inspect().await?;
            Ok(RoomSummary::from(&room))
        }
        RoomLookup::Cached(room) => Ok(RoomSummary::from(room.as_ref())),
        RoomLookup::NotFound => Err(RoomError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{cache::room_key, session_store::StorageBackend},
        state::{AppState, room::tests::quiz, state_machine::RoomPhase},
    };

    fn request() -> NewRoom {
        NewRoom {
            quiz_id: "quiz-1".into(),
            host_id: "host".into(),
            host_name: "Host".into(),
            settings: SettingsPatch {
                auto_next: Some(true),
                allow_answer_change: None,
            },
        }
    }

    #[tokio::test]
    async fn creating_a_room_stores_the_session_first() {
        let state = AppState::new(AppConfig::default());
        let (backend, _store) = StorageBackend::memory();
        state.set_backend(backend.clone()).await;

        let join_code = create_room(&state, Uuid::new_v4(), request()).await.unwrap();
        assert!(state.config().join_code_range().contains(&join_code));

        let room = route(&state, join_code).await.unwrap().inspect().await.unwrap();
        assert!(room.settings().auto_next);
        let session = backend
            .sessions
            .find_session(room.session_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.join_code, Some(join_code));
        assert_eq!(session.host_id.as_deref(), Some("host"));
    }

    #[tokio::test]
    async fn degraded_mode_refuses_new_rooms() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(
            create_room(&state, Uuid::new_v4(), request()).await,
            Err(RoomError::StorageUnavailable)
        );
        assert_eq!(state.rooms().room_count(), 0);
    }

    const HOST_CONNECTION: u128 = 1;

    fn cached_room(join_code: JoinCode, settings: RoomSettings) -> Room {
        let mut room = Room::new(
            join_code,
            Uuid::new_v4(),
            "quiz-1".into(),
            HostSeat {
                connection_id: Uuid::from_u128(HOST_CONNECTION),
                user_id: "host".into(),
                display_name: "Host".into(),
            },
            settings,
            None,
            50,
        );
        room.join(Uuid::new_v4(), "u1", "Ann", false).unwrap();
        room
    }

    /// Same room, already playing its first 30 s question since `started_at`.
    fn playing_room(join_code: JoinCode, settings: RoomSettings, started_at: SystemTime) -> Room {
        let mut room = cached_room(join_code, settings);
        let plan = room.plan_start(Uuid::from_u128(HOST_CONNECTION)).unwrap();
        room.apply_start(plan, quiz(2), started_at).unwrap();
        room
    }

    async fn memory_state_with(room: &Room) -> SharedState {
        let state = AppState::new(AppConfig::default());
        let (backend, _store) = StorageBackend::memory();
        state.set_backend(backend.clone()).await;
        backend
            .cache
            .put(
                room_key(room.join_code()),
                serde_json::to_value(room).unwrap(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        state
    }

    async fn live_room(state: &SharedState, join_code: JoinCode) -> Room {
        route(state, join_code).await.unwrap().inspect().await.unwrap()
    }

    #[tokio::test]
    async fn cached_room_is_revived_with_everyone_offline() {
        let state = memory_state_with(&cached_room(424242, RoomSettings::default())).await;

        let summary = room_summary(&state, 424242).await.unwrap();
        assert_eq!(summary.player_count, 1);
        assert!(!state.rooms().is_live(424242));

        let revived = live_room(&state, 424242).await;
        assert_eq!(revived.phase(), RoomPhase::Lobby);
        assert!(revived.participants().all(|p| !p.is_online));
        assert!(state.rooms().is_live(424242));

        let again = route(&state, 424242).await.unwrap();
        assert_eq!(again.join_code(), 424242);
        assert_eq!(state.rooms().room_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn revived_question_keeps_its_remaining_time() {
        let started_at = SystemTime::now() - Duration::from_secs(20);
        let state = memory_state_with(&playing_room(
            515151,
            RoomSettings::default(),
            started_at,
        ))
        .await;

        let revived = live_room(&state, 515151).await;
        assert_eq!(revived.phase(), RoomPhase::Question);
        assert_eq!(revived.current_question_index(), Some(0));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(live_room(&state, 515151).await.phase(), RoomPhase::Question);

        tokio::time::sleep(Duration::from_secs(6)).await;
        let settled = live_room(&state, 515151).await;
        assert_eq!(settled.phase(), RoomPhase::Results);
        assert_eq!(settled.current_question_index(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn revived_question_past_its_limit_settles_at_once() {
        let started_at = SystemTime::now() - Duration::from_secs(90);
        let state = memory_state_with(&playing_room(
            525252,
            RoomSettings::default(),
            started_at,
        ))
        .await;

        let revived = live_room(&state, 525252).await;
        assert_eq!(revived.phase(), RoomPhase::Results);
        assert_eq!(
            revived.round_outcome("u1").map(|outcome| outcome.points_gained),
            Some(0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn revived_results_screen_auto_advances() {
        let settings = RoomSettings {
            auto_next: true,
            allow_answer_change: false,
        };
        let mut room = playing_room(535353, settings, SystemTime::now());
        room.settle().unwrap();
        let state = memory_state_with(&room).await;

        let revived = live_room(&state, 535353).await;
        assert_eq!(revived.phase(), RoomPhase::Results);

        let delay = state.config().auto_next_delay;
        tokio::time::sleep(delay + Duration::from_millis(100)).await;
        let advanced = live_room(&state, 535353).await;
        assert_eq!(advanced.phase(), RoomPhase::Question);
        assert_eq!(advanced.current_question_index(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn revived_results_screen_waits_for_the_host_without_auto_next() {
        let mut room = playing_room(545454, RoomSettings::default(), SystemTime::now());
        room.settle().unwrap();
        let state = memory_state_with(&room).await;
        assert_eq!(live_room(&state, 545454).await.phase(), RoomPhase::Results);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(live_room(&state, 545454).await.phase(), RoomPhase::Results);
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(route(&state, 999_999).await.err(), Some(RoomError::NotFound));
    }
}
