#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum::extract::ws::Message;
use serde_json::{Value, json};
use tokio::{sync::mpsc, time::timeout};
use uuid::Uuid;

use live_quiz_back::{
    config::AppConfig,
    dao::{
        models::{QuestionEntity, QuestionOptionEntity, QuizEntity},
        session_store::{SessionStore, StorageBackend, memory::MemorySessionStore},
    },
    services::websocket_service,
    state::{AppState, ConnectionId, SharedState, connections::ClientConnection},
};

const FRAME_TIMEOUT: Duration = Duration::from_secs(300);

/// Quiz with `questions` questions of 30 s / 100 pts whose option 1 is correct.
pub fn quiz(id: &str, questions: usize) -> QuizEntity {
    QuizEntity {
        id: id.into(),
        title: "Capitals".into(),
        questions: (0..questions)
            .map(|i| QuestionEntity {
                id: format!("q{i}"),
                text: format!("Question {i}"),
                time_limit_secs: 30,
                points: 100,
                options: (0..4)
                    .map(|o| QuestionOptionEntity {
                        id: format!("q{i}-o{o}"),
                        text: format!("Option {o}"),
                        is_correct: o == 1,
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// App state over a fresh memory store seeded with `quiz-1` (2 questions) and `quiz-short` (1).
pub async fn memory_state() -> (SharedState, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    store.insert_quiz(quiz("quiz-1", 2));
    store.insert_quiz(quiz("quiz-short", 1));
    let state = with_store(store.clone()).await;
    (state, store)
}

/// App state over an arbitrary session store.
pub async fn with_store(store: Arc<dyn SessionStore>) -> SharedState {
    let state = AppState::new(AppConfig::default());
    let (memory, _) = StorageBackend::memory();
    state
        .set_backend(StorageBackend::new(store, memory.cache))
        .await;
    state
}

/// Fake socket: registered in the hub, frames collected from its writer channel.
pub struct TestClient {
    pub id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl TestClient {
    pub fn connect(state: &SharedState) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        state.connections().register(ClientConnection {
            id,
            team_id: None,
            tx,
        });
        Self { id, rx }
    }

    pub async fn send(&self, state: &SharedState, frame: Value) {
        websocket_service::handle_text(state, self.id, &frame.to_string()).await;
    }

    /// Socket closed by the client.
    pub async fn disconnect(self, state: &SharedState) {
        websocket_service::handle_disconnect(state, self.id).await;
        state.connections().unregister(self.id);
    }

    pub async fn next_frame(&mut self) -> Value {
        let message = timeout(FRAME_TIMEOUT, self.rx.recv())
            .await
            .expect("no frame before timeout")
            .expect("connection channel closed");
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).expect("frame is JSON"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    /// Frames already queued, without waiting.
    pub fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Message::Text(text) = message {
                frames.extend(serde_json::from_str::<Value>(text.as_str()).ok());
            }
        }
        frames
    }

    /// Next frame of the given `type`, skipping others.
    pub async fn expect(&mut self, frame_type: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["type"] == frame_type {
                return frame;
            }
        }
    }

    /// Next `room-state` frame satisfying `predicate`.
    pub async fn state_where(&mut self, predicate: impl Fn(&Value) -> bool) -> Value {
        loop {
            let frame = self.expect("room-state").await;
            if predicate(&frame) {
                return frame;
            }
        }
    }

    pub async fn state_in(&mut self, game_state: &str) -> Value {
        self.state_where(|frame| frame["gameState"] == game_state).await
    }
}

/// Open a room as `host-1` and return the host socket with the join code.
pub async fn open_room(state: &SharedState, quiz_id: &str, settings: Value) -> (TestClient, u32) {
    let mut host = TestClient::connect(state);
    host.send(
        state,
        json!({
            "type": "create-room",
            "quizId": quiz_id,
            "hostId": "host-1",
            "hostName": "Host",
            "settings": settings,
        }),
    )
    .await;
    let frame = host.state_in("lobby").await;
    let join_code = frame["roomId"].as_u64().expect("room id") as u32;
    (host, join_code)
}

pub async fn join(state: &SharedState, join_code: u32, user_id: &str) -> TestClient {
    let mut player = TestClient::connect(state);
    player
        .send(
            state,
            json!({
                "type": "join-room",
                "roomId": join_code,
                "userId": user_id,
                "username": user_id.to_uppercase(),
            }),
        )
        .await;
    player
        .state_where(|frame| participant(frame, user_id).is_some())
        .await;
    player
}

pub fn participant<'a>(frame: &'a Value, user_id: &str) -> Option<&'a Value> {
    frame["participants"]
        .as_array()?
        .iter()
        .find(|p| p["userId"] == user_id)
}

pub fn score_of(frame: &Value, user_id: &str) -> u64 {
    participant(frame, user_id)
        .and_then(|p| p["score"].as_u64())
        .expect("participant score")
}

/// Poll `check` while letting background tasks run.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}
