use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value};
use tracing::warn;
use uuid::Uuid;

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CacheBody, CouchDocument, END_SUFFIX, RevisionOnly, cache_doc_id,
        history_doc_id, history_prefix, quiz_doc_id, session_doc_id,
    },
};
use crate::dao::{
    cache::CacheStore,
    models::{
        FeedbackEntity, HistoryEntity, QuizEntity, SessionEntity, SessionFinalization,
        SessionStatus,
    },
    session_store::SessionStore,
    storage::StorageResult,
};

const MAX_CONFLICT_ATTEMPTS: u32 = 3;

/// CouchDB-backed session store; every entity lives in one database under a
/// type prefix, and the cache is emulated with expiring documents.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchSessionStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Write `body` under `doc_id`, carrying over the current revision if any.
    async fn upsert<T>(&self, doc_id: String, body: T) -> CouchResult<()>
    where
        T: Serialize,
    {
        let mut document = CouchDocument::new(doc_id, body);
        if let Some(existing) = self.get_document::<RevisionOnly>(&document.id).await? {
            document.rev = Some(existing.rev);
        }
        self.put_document(&document.id, &document).await
    }

    async fn delete_document(&self, doc_id: &str) -> CouchResult<()> {
        let Some(existing) = self.get_document::<RevisionOnly>(doc_id).await? else {
            return Ok(());
        };

        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", existing.rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", prefix)),
            ("endkey", format!("\"{}{}\"", prefix, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed = from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })?;
                documents.push(parsed);
            }
        }

        Ok(documents)
    }

    async fn find_session(&self, id: Uuid) -> CouchResult<Option<CouchDocument<SessionEntity>>> {
        self.get_document(&session_doc_id(id)).await
    }

    /// Read-modify-write of a session document; returns `false` if it is missing.
    ///
    /// A revision conflict re-reads the document and applies `modify` again.
    async fn modify_session<F>(&self, id: Uuid, modify: F) -> CouchResult<bool>
    where
        F: Fn(&mut SessionEntity),
    {
        let mut attempt = 1;
        loop {
            let Some(mut document) = self.find_session(id).await? else {
                return Ok(false);
            };
            modify(&mut document.body);
            match self.put_document(&document.id, &document).await {
                Ok(()) => return Ok(true),
                Err(err) if err.is_conflict() && attempt < MAX_CONFLICT_ATTEMPTS => {
                    warn!(session_id = %id, attempt, "session document changed concurrently, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn health_check(&self) -> CouchResult<()> {
        let url = format!("{}/{}", self.base_url, self.database);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: url.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: url,
                status: response.status(),
            })
        }
    }
}

fn epoch_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

impl SessionStore for CouchSessionStore {
    fn create_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(session_doc_id(session.id), session)
                .await
                .map_err(Into::into)
        })
    }

    fn update_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        at: SystemTime,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .modify_session(id, |session| {
                    session.status = status;
                    if status == SessionStatus::InProgress {
                        session.started_at = Some(at);
                    }
                })
                .await?;
            Ok(())
        })
    }

    fn finalize_session(
        &self,
        id: Uuid,
        finalization: SessionFinalization,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .modify_session(id, |session| {
                    session.status = finalization.status;
                    session.results = finalization.results.clone();
                    session.incomplete_questions = finalization.incomplete_questions.clone();
                    session.ended_at = Some(finalization.ended_at);
                })
                .await?;
            Ok(())
        })
    }

    fn append_feedback(
        &self,
        id: Uuid,
        feedback: FeedbackEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .modify_session(id, |session| session.feedback.push(feedback.clone()))
                .await
                .map_err(Into::into)
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store.find_session(id).await?;
            Ok(document.map(|doc| doc.body))
        })
    }

    fn append_history(&self, records: Vec<HistoryEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            for record in records {
                let doc_id = history_doc_id(&record.storage_key());
                store.upsert(doc_id, record).await?;
            }
            Ok(())
        })
    }

    fn list_history(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<HistoryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let documents = store
                .list_documents::<CouchDocument<HistoryEntity>>(&history_prefix(session_id))
                .await?;
            Ok(documents.into_iter().map(|doc| doc.body).collect())
        })
    }

    fn find_quiz(&self, quiz_id: String) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .get_document::<CouchDocument<QuizEntity>>(&quiz_doc_id(&quiz_id))
                .await?;
            Ok(document.map(|doc| doc.body))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.health_check().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

impl CacheStore for CouchSessionStore {
    fn put(&self, key: String, value: Value, ttl: Duration) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let body = CacheBody {
                value,
                expires_at_ms: epoch_ms(SystemTime::now() + ttl),
            };
            store
                .upsert(cache_doc_id(&key), body)
                .await
                .map_err(Into::into)
        })
    }

    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .get_document::<CouchDocument<CacheBody>>(&cache_doc_id(&key))
                .await?;
            let now = epoch_ms(SystemTime::now());
            Ok(document
                .filter(|doc| doc.body.expires_at_ms > now)
                .map(|doc| doc.body.value))
        })
    }

    fn delete(&self, key: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_document(&cache_doc_id(&key))
                .await
                .map_err(Into::into)
        })
    }
}
