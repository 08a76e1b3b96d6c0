use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::time::Instant;

use crate::dao::storage::StorageResult;

/// Short-lived key/value store of JSON payloads.
///
/// An expired entry reads exactly like a missing one; callers must treat the
/// cache as an optimisation and always be able to rebuild what it holds.
pub trait CacheStore: Send + Sync {
    fn put(&self, key: String, value: Value, ttl: Duration) -> BoxFuture<'static, StorageResult<()>>;
    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<Value>>>;
    fn delete(&self, key: String) -> BoxFuture<'static, StorageResult<()>>;
}

/// Cache key of a live room snapshot.
pub fn room_key(join_code: u32) -> String {
    format!("room:{join_code}")
}

/// Cache key of an assembled results payload.
pub fn results_key(session_id: uuid::Uuid) -> String {
    format!("results:{session_id}")
}

/// Process-local cache used by the memory backend and tests.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: std::sync::Arc<DashMap<String, (Value, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: &str) -> Option<Value> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.1 > Instant::now() => return Some(entry.0.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }
}

impl CacheStore for MemoryCache {
    fn put(&self, key: String, value: Value, ttl: Duration) -> BoxFuture<'static, StorageResult<()>> {
        self.entries.insert(key, (value, Instant::now() + ttl));
        Box::pin(async { Ok(()) })
    }

    fn get(&self, key: String) -> BoxFuture<'static, StorageResult<Option<Value>>> {
        let value = self.read(&key);
        Box::pin(async move { Ok(value) })
    }

    fn delete(&self, key: String) -> BoxFuture<'static, StorageResult<()>> {
        self.entries.remove(&key);
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .put("k".into(), json!({"a": 1}), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.get("k".into()).await.unwrap(), Some(json!({"a": 1})));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k".into()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new();
        cache
            .put(room_key(123456), json!(1), Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete(room_key(123456)).await.unwrap();
        assert_eq!(cache.get(room_key(123456)).await.unwrap(), None);
    }
}
