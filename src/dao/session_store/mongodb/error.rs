use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save session `{id}`")]
    SaveSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load session `{id}`")]
    LoadSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save answer history for session `{session_id}`")]
    SaveHistory {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load answer history for session `{session_id}`")]
    LoadHistory {
        session_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load quiz `{id}`")]
    LoadQuiz {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("cache operation on `{key}` failed")]
    Cache {
        key: String,
        #[source]
        source: MongoError,
    },
    #[error("stored document `{id}` is corrupt: {reason}")]
    CorruptDocument { id: String, reason: &'static str },
    #[error("failed to encode document for `{key}`")]
    Encode {
        key: String,
        #[source]
        source: mongodb::bson::error::Error,
    },
}

impl MongoDaoError {
    pub(super) fn corrupt(id: impl Into<String>, reason: &'static str) -> Self {
        MongoDaoError::CorruptDocument {
            id: id.into(),
            reason,
        }
    }
}
