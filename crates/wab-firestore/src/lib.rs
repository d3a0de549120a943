//! Firestore adapter over the REST API (reqwest).
//!
//! Implements the session store backend and the clinical/settings ports against
//! the datastore shared with the census web application.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub mod clinical;
pub mod session;
pub mod settings;
pub mod value;

pub use clinical::FirestoreClinicalStore;
pub use session::FirestoreSessionStore;
pub use settings::FirestoreSettingsSource;

use wab_core::{config::FirestoreConfig, errors::Error, session_store::StoreError};

#[derive(Debug, thiserror::Error)]
pub enum FirestoreError {
    #[error("firestore transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("firestore returned {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Upstream {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("firestore document decode error: {0}")]
    Decode(String),
}

impl From<FirestoreError> for Error {
    fn from(e: FirestoreError) -> Self {
        Error::External(e.to_string())
    }
}

impl From<FirestoreError> for StoreError {
    fn from(e: FirestoreError) -> Self {
        match e {
            FirestoreError::Decode(msg) => StoreError::Corrupt(msg),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Thin wrapper around reqwest for document reads and writes.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    documents_url: String,
    token: Option<String>,
}

impl FirestoreClient {
    pub fn new(cfg: &FirestoreConfig) -> Self {
        Self {
            http: Client::new(),
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                cfg.base_url.trim_end_matches('/'),
                cfg.project_id
            ),
            token: cfg.token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.documents_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    /// Raw JSON fields of `collection/doc`, or `None` if the document does not exist.
    pub async fn get_fields(&self, path: &str) -> Result<Option<Map<String, Value>>, FirestoreError> {
        let res = self
            .authorize(self.http.get(self.url(path)))
            .send()
            .await
            .map_err(FirestoreError::Transport)?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: DocumentResponse = check(res)
            .await?
            .json()
            .await
            .map_err(|e| FirestoreError::Decode(format!("{path}: {e}")))?;
        Ok(Some(value::decode_fields(&doc.fields)))
    }

    /// Typed read of `collection/doc`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, FirestoreError> {
        let Some(fields) = self.get_fields(path).await? else {
            return Ok(None);
        };
        serde_json::from_value(Value::Object(fields))
            .map(Some)
            .map_err(|e| FirestoreError::Decode(format!("{path}: {e}")))
    }

    /// Create or replace `collection/doc` with `doc`'s fields.
    pub async fn set<T: Serialize>(&self, path: &str, doc: &T) -> Result<(), FirestoreError> {
        let value = serde_json::to_value(doc).map_err(|e| FirestoreError::Decode(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(FirestoreError::Decode(format!("{path}: document must be an object")));
        };
        let res = self
            .authorize(self.http.patch(self.url(path)))
            .json(&json!({ "fields": value::encode_fields(&map) }))
            .send()
            .await
            .map_err(FirestoreError::Transport)?;
        check(res).await?;
        Ok(())
    }

    /// Delete `collection/doc`. Missing documents are not an error.
    pub async fn delete(&self, path: &str) -> Result<(), FirestoreError> {
        let res = self
            .authorize(self.http.delete(self.url(path)))
            .send()
            .await
            .map_err(FirestoreError::Transport)?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(res).await?;
        Ok(())
    }
}

async fn check(res: Response) -> Result<Response, FirestoreError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let message = res
        .json::<ErrorEnvelope>()
        .await
        .ok()
        .map(|env| env.error.message);
    Err(FirestoreError::Upstream { status, message })
}

/// Document ids may not contain `/`.
pub(crate) fn doc_id(raw: &str) -> String {
    raw.replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_urls() {
        let c = FirestoreClient::new(&FirestoreConfig {
            project_id: "hhr".into(),
            token: None,
            base_url: "http://localhost:8080/v1/".into(),
        });
        assert_eq!(
            c.url("whatsapp_sessions/RemoteAuth-hhr-bot"),
            "http://localhost:8080/v1/projects/hhr/databases/(default)/documents/whatsapp_sessions/RemoteAuth-hhr-bot"
        );
    }

    #[test]
    fn decode_errors_mark_records_corrupt() {
        let e: StoreError = FirestoreError::Decode("bad".into()).into();
        assert!(matches!(e, StoreError::Corrupt(_)));
        assert_eq!(doc_id("a/b"), "a_b");
    }
}
