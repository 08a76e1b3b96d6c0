use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const SESSION_PREFIX: &str = "session::";
pub const HISTORY_PREFIX: &str = "history::";
pub const QUIZ_PREFIX: &str = "quiz::";
pub const CACHE_PREFIX: &str = "cache::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[allow(dead_code)]
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Any stored entity wrapped with CouchDB's identity and revision fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: String, body: T) -> Self {
        Self { id, rev: None, body }
    }
}

/// Minimal view used to read the current revision of a document.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheBody {
    pub value: Value,
    /// Unix epoch milliseconds after which the entry reads as missing.
    pub expires_at_ms: u64,
}

pub fn session_doc_id(id: Uuid) -> String {
    format!("{SESSION_PREFIX}{id}")
}

pub fn history_prefix(session_id: Uuid) -> String {
    format!("{HISTORY_PREFIX}{session_id}:")
}

pub fn history_doc_id(storage_key: &str) -> String {
    format!("{HISTORY_PREFIX}{storage_key}")
}

pub fn quiz_doc_id(id: &str) -> String {
    format!("{QUIZ_PREFIX}{id}")
}

pub fn cache_doc_id(key: &str) -> String {
    format!("{CACHE_PREFIX}{key}")
}
