//! WhatsApp gateway adapter (reqwest).
//!
//! The WhatsApp Web protocol runs in a separate gateway process. This crate
//! implements the `wab-core` `SessionClient` and `MessagingPort` ports over the
//! gateway's HTTP API, and pumps its event feed into the bot's event channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::sleep;

pub mod pump;
pub mod wire;

pub use pump::EventPump;

use wab_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    formatting::split_message,
    messaging::{
        client::SessionClient,
        port::MessagingPort,
        types::{GroupInfo, MessagingCapabilities},
    },
    session_store::SessionBlob,
    Result,
};

use crate::wire::{
    ErrorResponse, EventBatch, ExportSessionResponse, GroupsResponse, SendMessageRequest,
    SendMessageResponse, StartSessionRequest,
};

/// WhatsApp's own limit is far higher; long texts are split for readability.
const MAX_MESSAGE_LEN: usize = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("gateway returned {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Upstream {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("gateway response decode error: {0}")]
    Decode(#[source] reqwest::Error),
}

impl GatewayError {
    /// Only failures that never reached the gateway are worth a retry.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

impl From<GatewayError> for Error {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Upstream {
                status: StatusCode::CONFLICT,
                ..
            } => Error::NotConnected,
            other => Error::External(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    client_id: String,
    token: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, client_id: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("gateway http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.get(self.url(path)))
            .timeout(REQUEST_TIMEOUT)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.post(self.url(path)))
            .timeout(REQUEST_TIMEOUT)
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::Future<Output = std::result::Result<T, GatewayError>> + Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempts < MAX_RETRIES => {
                    attempts += 1;
                    tracing::warn!(error = %e, "gateway request failed; retrying once");
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One long-poll for events after `cursor`.
    pub async fn poll_events(&self, cursor: u64, wait: Duration) -> std::result::Result<EventBatch, GatewayError> {
        let res = self
            .authorize(self.http.get(self.url("/events")))
            .query(&[
                ("after", cursor.to_string()),
                ("waitMs", wait.as_millis().to_string()),
            ])
            .timeout(wait + REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(GatewayError::Transport)?;
        decode(res).await
    }

    async fn send_once(&self, chat_id: &ChatId, text: &str) -> std::result::Result<SendMessageResponse, GatewayError> {
        let res = self
            .post("/messages")
            .json(&SendMessageRequest { chat_id, text })
            .send()
            .await
            .map_err(GatewayError::Transport)?;
        decode(res).await
    }
}

/// Map non-2xx responses to `Upstream`, keeping the gateway's error message.
async fn check(res: Response) -> std::result::Result<Response, GatewayError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let message = res
        .json::<ErrorResponse>()
        .await
        .ok()
        .map(|payload| payload.error);
    Err(GatewayError::Upstream { status, message })
}

async fn decode<T: DeserializeOwned>(res: Response) -> std::result::Result<T, GatewayError> {
    check(res)
        .await?
        .json::<T>()
        .await
        .map_err(GatewayError::Decode)
}

#[async_trait]
impl SessionClient for GatewayClient {
    async fn connect(&self, restore: Option<SessionBlob>) -> Result<()> {
        let session = restore.as_ref().map(SessionBlob::as_str);
        self.with_retry(|| async {
            let res = self
                .post("/session/start")
                .json(&StartSessionRequest {
                    client_id: &self.client_id,
                    session,
                })
                .send()
                .await
                .map_err(GatewayError::Transport)?;
            check(res).await.map(drop)
        })
        .await?;
        tracing::info!(gateway = %self.base_url, restore = session.is_some(), "gateway session started");
        Ok(())
    }

    async fn export_session(&self) -> Result<Option<SessionBlob>> {
        let body: ExportSessionResponse = self
            .with_retry(|| async {
                let res = self
                    .get("/session/export")
                    .send()
                    .await
                    .map_err(GatewayError::Transport)?;
                decode(res).await
            })
            .await?;
        Ok(body.session.filter(|s| !s.is_empty()).map(SessionBlob))
    }

    async fn logout(&self) -> Result<()> {
        self.with_retry(|| async {
            let res = self
                .post("/session/logout")
                .send()
                .await
                .map_err(GatewayError::Transport)?;
            check(res).await.map(drop)
        })
        .await
    }

    async fn list_groups(&self) -> Result<Vec<GroupInfo>> {
        let body: GroupsResponse = self
            .with_retry(|| async {
                let res = self
                    .get("/groups")
                    .send()
                    .await
                    .map_err(GatewayError::Transport)?;
                decode(res).await
            })
            .await?;
        Ok(body.groups)
    }
}

#[async_trait]
impl MessagingPort for GatewayClient {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: MAX_MESSAGE_LEN,
        }
    }

    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<MessageRef> {
        let mut first: Option<MessageId> = None;
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let sent = self.with_retry(|| self.send_once(chat_id, &chunk)).await?;
            first.get_or_insert(MessageId(sent.id));
        }
        Ok(MessageRef {
            chat_id: chat_id.clone(),
            message_id: first.unwrap_or_else(|| MessageId(String::new())),
        })
    }
}
