mod common;

use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use serde_json::json;
use uuid::Uuid;

use common::{eventually, join, open_room, quiz, with_store};
use live_quiz_back::dao::{
    models::{
        FeedbackEntity, HistoryEntity, QuizEntity, SessionEntity, SessionFinalization,
        SessionStatus,
    },
    session_store::{SessionStore, memory::MemorySessionStore},
    storage::{StorageError, StorageResult},
};

/// Memory store whose history writes always fail.
struct HistoryOutage {
    inner: MemorySessionStore,
}

impl SessionStore for HistoryOutage {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.create_session(session)
    }

    fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.update_status(id, status, at)
    }

    fn finalize_session(
        &self,
        id: Uuid,
        finalization: SessionFinalization,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.finalize_session(id, finalization)
    }

    fn append_feedback(
        &self,
        id: Uuid,
        feedback: FeedbackEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.append_feedback(id, feedback)
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        self.inner.find_session(id)
    }

    fn append_history(&self, _records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async {
            Err(StorageError::unavailable(
                "history collection offline".into(),
                std::io::Error::other("write refused"),
            ))
        })
    }

    fn list_history(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        self.inner.list_history(session_id)
    }

    fn find_quiz(&self, quiz_id: String) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        self.inner.find_quiz(quiz_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

#[tokio::test(start_paused = true)]
async fn failed_history_warns_the_host_and_flags_the_round() {
    let inner = MemorySessionStore::new();
    inner.insert_quiz(quiz("quiz-short", 1));
    let store = Arc::new(HistoryOutage {
        inner: inner.clone(),
    });
    let state = with_store(store).await;

    let (mut host, code) = open_room(&state, "quiz-short", json!({})).await;
    let mut player = join(&state, code, "u1").await;

    host.send(&state, json!({"type": "start-game", "roomId": code}))
        .await;
    let opened = player.state_in("question").await;
    let session: Uuid = opened["sessionId"].as_str().unwrap().parse().unwrap();

    player
        .send(
            &state,
            json!({"type": "submit-answer", "roomId": code, "optionIndex": 1}),
        )
        .await;
    player.state_in("results").await;

    let warning = host.expect("warning").await;
    assert!(
        warning["message"]
            .as_str()
            .unwrap()
            .contains("question 1")
    );
    // Players never see durability warnings.
    assert!(player.drain().iter().all(|frame| frame["type"] != "warning"));

    host.send(
        &state,
        json!({"type": "request-next-question", "roomId": code}),
    )
    .await;
    host.state_in("end").await;

    eventually(|| {
        let inner = inner.clone();
        async move {
            inner
                .find_session(session)
                .await
                .ok()
                .flatten()
                .is_some_and(|s| s.status == SessionStatus::Completed)
        }
    })
    .await;
    let finished = inner.find_session(session).await.unwrap().unwrap();
    assert_eq!(finished.incomplete_questions, vec![0]);
    assert_eq!(finished.results.len(), 1);
    assert_eq!(finished.results[0].final_rank, 1);
}
