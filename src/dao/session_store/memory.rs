//! Process-local store used for tests and `STORAGE_BACKEND=memory`.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{
        FeedbackEntity, HistoryEntity, QuizEntity, SessionEntity, SessionFinalization,
        SessionStatus,
    },
    session_store::SessionStore,
    storage::StorageResult,
};

#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<Uuid, SessionEntity>>,
    history: Arc<RwLock<IndexMap<String, HistoryEntity>>>,
    quizzes: Arc<DashMap<String, QuizEntity>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make quiz content available to rooms and solo sessions.
    pub fn insert_quiz(&self, quiz: QuizEntity) {
        self.quizzes.insert(quiz.id.clone(), quiz);
    }
}

impl SessionStore for MemorySessionStore {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.sessions.insert(session.id, session);
        Box::pin(async { Ok(()) })
    }

    fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.status = status;
            if status == SessionStatus::InProgress {
                session.started_at = Some(at);
            }
        }
        Box::pin(async { Ok(()) })
    }

    fn finalize_session(
        &self,
        id: Uuid,
        finalization: SessionFinalization,
    ) -> BoxFuture<'static, StorageResult<()>> {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.status = finalization.status;
            session.results = finalization.results;
            session.incomplete_questions = finalization.incomplete_questions;
            session.ended_at = Some(finalization.ended_at);
        }
        Box::pin(async { Ok(()) })
    }

    fn append_feedback(
        &self,
        id: Uuid,
        feedback: FeedbackEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let found = match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.feedback.push(feedback);
                true
            }
            None => false,
        };
        Box::pin(async move { Ok(found) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let session = self.sessions.get(&id).map(|entry| entry.clone());
        Box::pin(async move { Ok(session) })
    }

    fn append_history(&self, records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let history = self.history.clone();
        Box::pin(async move {
            let mut guard = history.write().await;
            for record in records {
                guard.insert(record.storage_key(), record);
            }
            Ok(())
        })
    }

    fn list_history(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        let history = self.history.clone();
        Box::pin(async move {
            let guard = history.read().await;
            Ok(guard
                .values()
                .filter(|record| record.game_session_id == session_id)
                .cloned()
                .collect())
        })
    }

    fn find_quiz(&self, quiz_id: String) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let quiz = self.quizzes.get(&quiz_id).map(|entry| entry.clone());
        Box::pin(async move { Ok(quiz) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{AttemptEntity, ParticipantRef};

    fn record(session: Uuid, question: &str, user: &str, score: u32) -> HistoryEntity {
        HistoryEntity {
            game_session_id: session,
            quiz_id: "quiz".into(),
            question_id: question.into(),
            question_index: 0,
            participant: ParticipantRef::UserId(user.into()),
            attempts: vec![AttemptEntity {
                selected_option_id: "a".into(),
                is_correct: score > 0,
                answer_time_ms: 500,
            }],
            is_ultimately_correct: score > 0,
            final_score_gained: score,
        }
    }

    #[tokio::test]
    async fn history_replays_do_not_duplicate() {
        let store = MemorySessionStore::new();
        let session = Uuid::new_v4();
        let other = Uuid::new_v4();

        store
            .append_history(vec![record(session, "q1", "u1", 80), record(other, "q1", "u1", 10)])
            .await
            .unwrap();
        store
            .append_history(vec![record(session, "q1", "u1", 80)])
            .await
            .unwrap();

        let history = store.list_history(session).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].final_score_gained, 80);
    }

    #[tokio::test]
    async fn in_progress_status_stamps_start_time() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();
        store
            .create_session(SessionEntity::multiplayer(
                id,
                "quiz".into(),
                "host".into(),
                123456,
                None,
            ))
            .await
            .unwrap();

        let at = SystemTime::now();
        store
            .update_status(id, SessionStatus::InProgress, at)
            .await
            .unwrap();

        let session = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.started_at, Some(at));
    }

    #[tokio::test]
    async fn feedback_on_unknown_session_reports_missing() {
        let store = MemorySessionStore::new();
        let stored = store
            .append_feedback(
                Uuid::new_v4(),
                FeedbackEntity {
                    rating: 5,
                    comment: None,
                    submitted_at: SystemTime::now(),
                },
            )
            .await
            .unwrap();
        assert!(!stored);
    }
}
