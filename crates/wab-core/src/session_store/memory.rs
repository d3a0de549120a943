use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::SessionId;

use super::{SessionBlob, SessionRecord, SessionStore, StoreResult};

/// In-process backend. Sessions are lost on restart; used in tests and for
/// throwaway local runs.
#[derive(Default)]
pub struct MemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, session_id: &SessionId) -> Option<SessionRecord> {
        self.records.lock().await.get(session_id.as_str()).cloned()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, session_id: &SessionId) -> StoreResult<bool> {
        Ok(self.records.lock().await.contains_key(session_id.as_str()))
    }

    async fn extract(&self, session_id: &SessionId) -> StoreResult<Option<SessionBlob>> {
        Ok(self
            .records
            .lock()
            .await
            .get(session_id.as_str())
            .map(|r| r.blob.clone()))
    }

    async fn store(&self, session_id: &SessionId, blob: &SessionBlob) -> StoreResult<()> {
        let record = SessionRecord {
            session_id: session_id.clone(),
            blob: blob.clone(),
            last_updated: Utc::now(),
        };
        self.records
            .lock()
            .await
            .insert(session_id.0.clone(), record);
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> StoreResult<()> {
        self.records.lock().await.remove(session_id.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_overwrites_and_refreshes_timestamp() {
        let store = MemorySessionStore::new();
        let id = SessionId::for_client("bot");

        store.store(&id, &SessionBlob("one".into())).await.unwrap();
        let first = store.record(&id).await.unwrap();
        store.store(&id, &SessionBlob("two".into())).await.unwrap();
        let second = store.record(&id).await.unwrap();

        assert_eq!(second.blob, SessionBlob("two".into()));
        assert!(second.last_updated >= first.last_updated);
    }

    #[tokio::test]
    async fn empty_blob_round_trips() {
        let store = MemorySessionStore::new();
        let id = SessionId::for_client("bot");
        store.store(&id, &SessionBlob(String::new())).await.unwrap();
        assert!(store.exists(&id).await.unwrap());
        assert_eq!(store.extract(&id).await.unwrap(), Some(SessionBlob(String::new())));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemorySessionStore::new();
        let id = SessionId::for_client("bot");
        store.delete(&id).await.unwrap();
        store.store(&id, &SessionBlob("x".into())).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await.unwrap());
        assert!(store.extract(&id).await.unwrap().is_none());
    }
}
