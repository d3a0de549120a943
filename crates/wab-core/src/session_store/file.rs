use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::SessionId;

use super::{SessionBlob, SessionDocument, SessionStore, StoreError, StoreResult};

/// Filesystem backend: one JSON document per session id inside `dir`.
///
/// Writes go to a temp file and are renamed into place so a crash mid-backup
/// never leaves a truncated session behind.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &SessionId) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_file_stem(session_id.as_str())))
    }

    async fn read_document(&self, session_id: &SessionId) -> StoreResult<Option<SessionDocument>> {
        let path = self.path_for(session_id);
        let txt = match tokio::fs::read_to_string(&path).await {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable(&path, e)),
        };
        if txt.trim().is_empty() {
            return Ok(None);
        }
        let doc: SessionDocument = serde_json::from_str(&txt)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
        Ok(Some(doc))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn exists(&self, session_id: &SessionId) -> StoreResult<bool> {
        let path = self.path_for(session_id);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| unavailable(&path, e))
    }

    async fn extract(&self, session_id: &SessionId) -> StoreResult<Option<SessionBlob>> {
        Ok(self
            .read_document(session_id)
            .await?
            .map(|doc| SessionBlob(doc.session)))
    }

    async fn store(&self, session_id: &SessionId, blob: &SessionBlob) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| unavailable(&self.dir, e))?;

        let path = self.path_for(session_id);
        let tmp = path.with_extension("json.tmp");
        let doc = SessionDocument::new(blob, Utc::now());
        let txt = serde_json::to_string(&doc)
            .map_err(|e| StoreError::Corrupt(format!("encode {session_id}: {e}")))?;

        tokio::fs::write(&tmp, txt)
            .await
            .map_err(|e| unavailable(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| unavailable(&path, e))?;
        Ok(())
    }

    async fn delete(&self, session_id: &SessionId) -> StoreResult<()> {
        let path = self.path_for(session_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(&path, e)),
        }
    }
}

fn unavailable(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {e}", path.display()))
}

fn sanitize_file_stem(raw: &str) -> String {
    let stem: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    // Leading dots would hide the file or walk upwards.
    let trimmed = stem.trim_start_matches('.');
    if trimmed.is_empty() {
        "session".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wab-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn store_then_extract_round_trips() {
        let dir = temp_dir("file-roundtrip");
        let store = FileSessionStore::new(&dir);
        let id = SessionId::for_client("hhr-bot");

        assert!(!store.exists(&id).await.unwrap());
        assert!(store.extract(&id).await.unwrap().is_none());

        let blob = SessionBlob("{\"WABrowserId\":\"abc\"}\n\u{00f1}".into());
        store.store(&id, &blob).await.unwrap();
        assert!(store.exists(&id).await.unwrap());
        assert_eq!(store.extract(&id).await.unwrap(), Some(blob));

        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("RemoteAuth-hhr-bot.json")).unwrap())
                .unwrap();
        assert!(on_disk.get("lastUpdated").is_some());

        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await.unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_blob_round_trips() {
        let dir = temp_dir("file-empty");
        let store = FileSessionStore::new(&dir);
        let id = SessionId::for_client("hhr-bot");

        store.store(&id, &SessionBlob(String::new())).await.unwrap();
        assert!(store.exists(&id).await.unwrap());
        assert_eq!(store.extract(&id).await.unwrap(), Some(SessionBlob(String::new())));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unreadable_document_is_reported_as_corrupt() {
        let dir = temp_dir("file-corrupt");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("s.json"), "not json").unwrap();

        let store = FileSessionStore::new(&dir);
        let res = store.extract(&SessionId("s".into())).await;
        assert!(matches!(res, Err(StoreError::Corrupt(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn session_ids_cannot_escape_the_directory() {
        assert_eq!(sanitize_file_stem("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_stem("..."), "session");
        assert_eq!(sanitize_file_stem("RemoteAuth-a b"), "RemoteAuth-a_b");
    }
}
