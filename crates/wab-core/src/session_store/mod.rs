//! Remote session persistence for the messaging client.
//!
//! The client periodically exports an opaque session blob; persisting it lets the
//! bot reconnect after restarts without scanning a new QR code. Backends implement
//! [`SessionStore`]; the coordinator talks to them through [`SessionVault`], which
//! turns backend failures into logged, non-fatal outcomes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::SessionId;

pub mod file;
pub mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

/// Opaque serialized client session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionBlob(pub String);

impl SessionBlob {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Session blobs are credentials; never print them.
impl std::fmt::Debug for SessionBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionBlob({} bytes)", self.0.len())
    }
}

/// One stored session, keyed by session id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub blob: SessionBlob,
    pub last_updated: DateTime<Utc>,
}

/// Persisted document shape shared by document-style backends:
/// `{ "session": string, "lastUpdated": ISO8601 }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub session: String,
    pub last_updated: String,
}

impl SessionDocument {
    pub fn new(blob: &SessionBlob, at: DateTime<Utc>) -> Self {
        Self {
            session: blob.0.clone(),
            last_updated: at.to_rfc3339(),
        }
    }

    pub fn into_record(self, session_id: &SessionId) -> StoreResult<SessionRecord> {
        let last_updated = DateTime::parse_from_rfc3339(&self.last_updated)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| {
                StoreError::Corrupt(format!(
                    "{session_id}: invalid lastUpdated {:?}: {e}",
                    self.last_updated
                ))
            })?;
        Ok(SessionRecord {
            session_id: session_id.clone(),
            blob: SessionBlob(self.session),
            last_updated,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or failed the operation.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// A record exists but cannot be decoded.
    #[error("corrupt session record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Backend port. One implementation per storage technology.
///
/// Implementations must be idempotent: `store` upserts, `delete` of an absent
/// record succeeds, and no operation requires a prior `exists` check.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short backend name for logs and status output.
    fn backend(&self) -> &'static str;

    async fn exists(&self, session_id: &SessionId) -> StoreResult<bool>;

    async fn extract(&self, session_id: &SessionId) -> StoreResult<Option<SessionBlob>>;

    async fn store(&self, session_id: &SessionId, blob: &SessionBlob) -> StoreResult<()>;

    async fn delete(&self, session_id: &SessionId) -> StoreResult<()>;

    /// Required by the client's auth-strategy contract; persistence happens in `store`.
    async fn save(&self, _session_id: &SessionId) -> StoreResult<()> {
        Ok(())
    }
}

/// Caller-facing session store wrapper.
///
/// Backend errors never propagate as fatal here: `exists` fails closed, `store`
/// and `delete` report a success flag, and every failure is logged. `extract`
/// keeps "absent" (`Ok(None)`) and "store unreachable" (`Err`) apart so callers can
/// decide, but both lead to fresh authentication in the bot.
#[derive(Clone)]
pub struct SessionVault {
    backend: Arc<dyn SessionStore>,
}

impl SessionVault {
    pub fn new(backend: Arc<dyn SessionStore>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend()
    }

    pub async fn exists(&self, session_id: &SessionId) -> bool {
        match self.backend.exists(session_id).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(session = %session_id, backend = self.backend_name(), error = %e, "session existence check failed; assuming none");
                false
            }
        }
    }

    pub async fn extract(&self, session_id: &SessionId) -> StoreResult<Option<SessionBlob>> {
        let res = self.backend.extract(session_id).await;
        match &res {
            Ok(Some(blob)) => {
                tracing::debug!(session = %session_id, bytes = blob.len(), "session extracted")
            }
            Ok(None) => tracing::debug!(session = %session_id, "no stored session"),
            Err(e) => {
                tracing::warn!(session = %session_id, backend = self.backend_name(), error = %e, "session extract failed")
            }
        }
        res
    }

    pub async fn store(&self, session_id: &SessionId, blob: &SessionBlob) -> bool {
        match self.backend.store(session_id, blob).await {
            Ok(()) => {
                tracing::debug!(session = %session_id, bytes = blob.len(), "session backed up");
                true
            }
            Err(e) => {
                tracing::warn!(session = %session_id, backend = self.backend_name(), error = %e, "session backup failed");
                false
            }
        }
    }

    pub async fn delete(&self, session_id: &SessionId) -> bool {
        match self.backend.delete(session_id).await {
            Ok(()) => {
                tracing::info!(session = %session_id, "stored session deleted");
                true
            }
            Err(e) => {
                tracing::warn!(session = %session_id, backend = self.backend_name(), error = %e, "session delete failed");
                false
            }
        }
    }

    pub async fn save(&self, session_id: &SessionId) {
        let _ = self.backend.save(session_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that fails every call.
    struct Unreachable;

    #[async_trait]
    impl SessionStore for Unreachable {
        fn backend(&self) -> &'static str {
            "unreachable"
        }

        async fn exists(&self, _id: &SessionId) -> StoreResult<bool> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn extract(&self, _id: &SessionId) -> StoreResult<Option<SessionBlob>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn store(&self, _id: &SessionId, _blob: &SessionBlob) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn delete(&self, _id: &SessionId) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn vault_degrades_on_backend_errors() {
        let vault = SessionVault::new(Arc::new(Unreachable));
        let id = SessionId::for_client("x");

        assert!(!vault.exists(&id).await);
        assert!(matches!(
            vault.extract(&id).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(!vault.store(&id, &SessionBlob("b".into())).await);
        assert!(!vault.delete(&id).await);
        vault.save(&id).await;
    }

    #[tokio::test]
    async fn vault_passes_through_healthy_backend() {
        let vault = SessionVault::new(Arc::new(MemorySessionStore::new()));
        let id = SessionId::for_client("x");

        assert!(vault.extract(&id).await.unwrap().is_none());
        assert!(vault.store(&id, &SessionBlob("blob".into())).await);
        assert!(vault.exists(&id).await);
        assert_eq!(
            vault.extract(&id).await.unwrap(),
            Some(SessionBlob("blob".into()))
        );
    }

    #[test]
    fn document_round_trips_into_record() {
        let at = DateTime::parse_from_rfc3339("2025-03-10T08:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let doc = SessionDocument::new(&SessionBlob("abc".into()), at);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["session"], "abc");
        assert!(json["lastUpdated"].as_str().unwrap().starts_with("2025-03-10T08:15:00"));

        let rec = doc.into_record(&SessionId("s".into())).unwrap();
        assert_eq!(rec.last_updated, at);
    }

    #[test]
    fn document_with_bad_timestamp_is_corrupt() {
        let doc = SessionDocument {
            session: "abc".into(),
            last_updated: "yesterday".into(),
        };
        assert!(matches!(
            doc.into_record(&SessionId("s".into())),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn blob_debug_hides_contents() {
        let blob = SessionBlob("secret-token".into());
        assert_eq!(format!("{blob:?}"), "SessionBlob(12 bytes)");
    }
}
