use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc, serialize_to_bson},
    options::IndexOptions,
};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoCacheDocument, MongoHistoryDocument, MongoQuizDocument, MongoSessionDocument, doc_id,
    },
};
use crate::dao::{
    cache::CacheStore,
    models::{
        FeedbackEntity, HistoryEntity, QuizEntity, SessionEntity, SessionFinalization,
        SessionStatus,
    },
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

const SESSION_COLLECTION_NAME: &str = "game_sessions";
const HISTORY_COLLECTION_NAME: &str = "answer_history";
const QUIZ_COLLECTION_NAME: &str = "quizzes";
const CACHE_COLLECTION_NAME: &str = "cache";

/// MongoDB-backed session store, also serving as the shared cache.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let history = database.collection::<Document>(HISTORY_COLLECTION_NAME);
        let history_index = IndexModel::builder()
            .keys(doc! {"gameSessionId": 1, "questionId": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("history_session_idx".to_owned()))
                    .build(),
            )
            .build();
        history
            .create_index(history_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: HISTORY_COLLECTION_NAME,
                index: "gameSessionId,questionId",
                source,
            })?;

        let sessions = database.collection::<Document>(SESSION_COLLECTION_NAME);
        let join_code_index = IndexModel::builder()
            .keys(doc! {"joinCode": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_join_code_idx".to_owned()))
                    .build(),
            )
            .build();
        sessions
            .create_index(join_code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "joinCode",
                source,
            })?;

        // Documents are dropped by the server once `expiresAt` is in the past.
        let cache = database.collection::<Document>(CACHE_COLLECTION_NAME);
        let ttl_index = IndexModel::builder()
            .keys(doc! {"expiresAt": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("cache_ttl_idx".to_owned()))
                    .expire_after(Some(Duration::ZERO))
                    .build(),
            )
            .build();
        cache
            .create_index(ttl_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: CACHE_COLLECTION_NAME,
                index: "expiresAt",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database().await.collection(SESSION_COLLECTION_NAME)
    }

    async fn history(&self) -> Collection<MongoHistoryDocument> {
        self.database().await.collection(HISTORY_COLLECTION_NAME)
    }

    async fn quizzes(&self) -> Collection<MongoQuizDocument> {
        self.database().await.collection(QUIZ_COLLECTION_NAME)
    }

    async fn cache(&self) -> Collection<MongoCacheDocument> {
        self.database().await.collection(CACHE_COLLECTION_NAME)
    }

    async fn create_session(&self, session: SessionEntity) -> MongoResult<()> {
        let id = session.id;
        let document: MongoSessionDocument = session.into();
        self.sessions()
            .await
            .replace_one(doc_id(id.to_string()), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: SessionStatus, at: SystemTime) -> MongoResult<()> {
        let key = id.to_string();
        let encoded = serialize_to_bson(&status).map_err(|source| MongoDaoError::Encode {
            key: key.clone(),
            source,
        })?;
        let mut set = doc! {"status": encoded};
        if status == SessionStatus::InProgress {
            set.insert("startedAt", DateTime::from_system_time(at));
        }

        self.sessions()
            .await
            .update_one(doc_id(key), doc! {"$set": set})
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        Ok(())
    }

    async fn finalize_session(&self, id: Uuid, finalization: SessionFinalization) -> MongoResult<()> {
        let key = id.to_string();
        let encode = |source: mongodb::bson::error::Error| MongoDaoError::Encode {
            key: key.clone(),
            source,
        };
        let status = serialize_to_bson(&finalization.status).map_err(encode)?;
        let results = serialize_to_bson(&finalization.results).map_err(encode)?;
        let incomplete = serialize_to_bson(&finalization.incomplete_questions).map_err(encode)?;
        let set = doc! {
            "status": status,
            "results": results,
            "incompleteQuestions": incomplete,
            "endedAt": DateTime::from_system_time(finalization.ended_at),
        };

        self.sessions()
            .await
            .update_one(doc_id(key.as_str()), doc! {"$set": set})
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        Ok(())
    }

    async fn append_feedback(&self, id: Uuid, feedback: FeedbackEntity) -> MongoResult<bool> {
        let key = id.to_string();
        let entry = serialize_to_bson(&feedback).map_err(|source| MongoDaoError::Encode {
            key: key.clone(),
            source,
        })?;

        let result = self
            .sessions()
            .await
            .update_one(doc_id(key), doc! {"$push": {"feedback": entry}})
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let document = self
            .sessions()
            .await
            .find_one(doc_id(id.to_string()))
            .await
            .map_err(|source| MongoDaoError::LoadSession { id, source })?;

        document.map(SessionEntity::try_from).transpose()
    }

    async fn append_history(&self, records: Vec<HistoryEntity>) -> MongoResult<()> {
        let collection = self.history().await;
        for record in records {
            let session_id = record.game_session_id;
            let document: MongoHistoryDocument = record.into();
            collection
                .replace_one(doc_id(document.id()), &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveHistory { session_id, source })?;
        }
        Ok(())
    }

    async fn list_history(&self, session_id: Uuid) -> MongoResult<Vec<HistoryEntity>> {
        let documents: Vec<MongoHistoryDocument> = self
            .history()
            .await
            .find(doc! {"gameSessionId": session_id.to_string()})
            .sort(doc! {"questionIndex": 1})
            .await
            .map_err(|source| MongoDaoError::LoadHistory { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadHistory { session_id, source })?;

        documents.into_iter().map(HistoryEntity::try_from).collect()
    }

    async fn find_quiz(&self, id: String) -> MongoResult<Option<QuizEntity>> {
        let document = self
            .quizzes()
            .await
            .find_one(doc_id(id.clone()))
            .await
            .map_err(|source| MongoDaoError::LoadQuiz { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn cache_put(&self, key: String, value: Value, ttl: Duration) -> StorageResult<()> {
        let payload =
            serde_json::to_string(&value).map_err(|source| StorageError::malformed(&key, source))?;
        let expires_at = DateTime::from_system_time(SystemTime::now() + ttl);
        let document = MongoCacheDocument {
            key: key.clone(),
            payload,
            expires_at,
        };

        self.cache()
            .await
            .replace_one(doc_id(key.clone()), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Cache { key, source })?;
        Ok(())
    }

    async fn cache_get(&self, key: String) -> StorageResult<Option<Value>> {
        let document = self
            .cache()
            .await
            .find_one(doc_id(key.clone()))
            .await
            .map_err(|source| MongoDaoError::Cache {
                key: key.clone(),
                source,
            })?;

        // The TTL monitor runs about once a minute, so stale entries may linger.
        let Some(document) = document.filter(|doc| doc.expires_at > DateTime::now()) else {
            return Ok(None);
        };
        serde_json::from_str(&document.payload)
            .map(Some)
            .map_err(|source| StorageError::malformed(&key, source))
    }

    async fn cache_delete(&self, key: String) -> MongoResult<()> {
        self.cache()
            .await
            .delete_one(doc_id(key.clone()))
            .await
            .map_err(|source| MongoDaoError::Cache { key, source })?;
        Ok(())
    }
}

impl SessionStore for MongoSessionStore {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_session(session).await.map_err(Into::into) })
    }

    fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update_status(id, status, at).await.map_err(Into::into) })
    }

    fn finalize_session(
        &self,
        id: Uuid,
        finalization: SessionFinalization,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .finalize_session(id, finalization)
                .await
                .map_err(Into::into)
        })
    }

    fn append_feedback(
        &self,
        id: Uuid,
        feedback: FeedbackEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.append_feedback(id, feedback).await.map_err(Into::into) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn append_history(&self, records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_history(records).await.map_err(Into::into) })
    }

    fn list_history(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_history(session_id).await.map_err(Into::into) })
    }

    fn find_quiz(&self, quiz_id: String) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_quiz(quiz_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}

impl CacheStore for MongoSessionStore {
    fn put(&self, key: String, value: Value, ttl: Duration) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.cache_put(key, value, ttl).await })
    }

    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        Box::pin(async move { store.cache_get(key).await })
    }

    fn delete(&self, key: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.cache_delete(key).await.map_err(Into::into) })
    }
}
