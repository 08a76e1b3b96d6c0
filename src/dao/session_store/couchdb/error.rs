//! Error types of the CouchDB session store.

use reqwest::StatusCode;
use thiserror::Error;

/// Result alias for CouchDB operations.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while talking to CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// `COUCH_BASE_URL` or `COUCH_DB` is not set.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The HTTP client could not be built.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// Probing the quiz database failed.
    #[error("failed to query CouchDB database `{database}`")]
    DatabaseQuery {
        /// Database name.
        database: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The quiz database was missing and could not be created.
    #[error("failed to create CouchDB database `{database}`")]
    DatabaseCreate {
        /// Database name.
        database: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected status while probing or creating the database.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        /// Database name.
        database: String,
        /// Status CouchDB answered with.
        status: StatusCode,
    },
    /// A document request never reached CouchDB.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        /// Document id or endpoint.
        path: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// A write carried a stale `_rev`; someone else updated the document first.
    #[error("CouchDB revision conflict on `{path}`")]
    RevisionConflict {
        /// Document id.
        path: String,
    },
    /// Unexpected status for a document request.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus {
        /// Document id or endpoint.
        path: String,
        /// Status CouchDB answered with.
        status: StatusCode,
    },
    /// The response body was not JSON.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        /// Document id or endpoint.
        path: String,
        /// Decoding error.
        #[source]
        source: reqwest::Error,
    },
    /// A stored document does not match the session, history or quiz shape.
    #[error("failed to deserialize CouchDB value for `{path}`")]
    DeserializeValue {
        /// Document id or endpoint.
        path: String,
        /// Shape mismatch.
        #[source]
        source: serde_json::Error,
    },
}

impl CouchDaoError {
    /// Whether retrying the read-modify-write cycle can succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CouchDaoError::RevisionConflict { .. })
    }
}
