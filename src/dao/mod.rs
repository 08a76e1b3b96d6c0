/// TTL key/value cache backing the room fallback and the result cache.
pub mod cache;
/// Persisted record shapes shared by every backend.
pub mod models;
/// Session, history and quiz persistence backends.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
