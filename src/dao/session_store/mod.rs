#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::{sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    cache::CacheStore,
    models::{
        FeedbackEntity, HistoryEntity, QuizEntity, SessionEntity, SessionFinalization,
        SessionStatus,
    },
    storage::StorageResult,
};

/// Abstraction over the durable store for sessions, answer history and quiz content.
pub trait SessionStore: Send + Sync {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Change the status; moving to `in_progress` also stamps `startedAt`.
    fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn finalize_session(
        &self,
        id: Uuid,
        finalization: SessionFinalization,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Returns `false` when the session does not exist.
    fn append_feedback(
        &self,
        id: Uuid,
        feedback: FeedbackEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Upsert keyed by [`HistoryEntity::storage_key`], so replays never duplicate.
    fn append_history(&self, records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>>;
    fn list_history(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>>;
    fn find_quiz(&self, quiz_id: String) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Installed persistence backend: durable sessions plus the TTL cache.
#[derive(Clone)]
pub struct StorageBackend {
    pub sessions: Arc<dyn SessionStore>,
    pub cache: Arc<dyn CacheStore>,
}

impl StorageBackend {
    pub fn new(sessions: Arc<dyn SessionStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self { sessions, cache }
    }

    /// Process-local backend with an empty store.
    pub fn memory() -> (Self, Arc<memory::MemorySessionStore>) {
        let store = Arc::new(memory::MemorySessionStore::new());
        let backend = Self::new(store.clone(), Arc::new(crate::dao::cache::MemoryCache::new()));
        (backend, store)
    }
}
