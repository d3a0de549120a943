use async_trait::async_trait;
use chrono::Utc;

use wab_core::{
    domain::SessionId,
    session_store::{SessionBlob, SessionDocument, SessionStore, StoreResult},
};

use crate::{doc_id, FirestoreClient};

/// One `{session, lastUpdated}` document per session id.
#[derive(Clone)]
pub struct FirestoreSessionStore {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreSessionStore {
    pub fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    fn path(&self, session_id: &SessionId) -> String {
        format!("{}/{}", self.collection, doc_id(session_id.as_str()))
    }

    async fn document(&self, session_id: &SessionId) -> StoreResult<Option<SessionDocument>> {
        Ok(self.client.get(&self.path(session_id)).await?)
    }
}

#[async_trait]
impl SessionStore for FirestoreSessionStore {
    fn backend(&self) -> &'static str {
        "firestore"
    }

    async fn exists(&self, session_id: &SessionId) -> StoreResult<bool> {
        Ok(self.document(session_id).await?.is_some())
    }

    async fn extract(&self, session_id: &SessionId) -> StoreResult<Option<SessionBlob>> {
        let Some(doc) = self.document(session_id).await? else {
            return Ok(None);
        };
        let record = doc.into_record(session_id)?;
        Ok(Some(record.blob))
    }

    async fn store(&self, session_id: &SessionId, blob: &SessionBlob) -> StoreResult<()> {
        let doc = SessionDocument::new(blob, Utc::now());
        Ok(self.client.set(&self.path(session_id), &doc).await?)
    }

    async fn delete(&self, session_id: &SessionId) -> StoreResult<()> {
        Ok(self.client.delete(&self.path(session_id)).await?)
    }
}
