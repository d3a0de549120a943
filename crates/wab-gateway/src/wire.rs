//! JSON shapes of the gateway HTTP API.

use serde::{Deserialize, Serialize};

use wab_core::{
    domain::ChatId,
    messaging::{
        client::{inbound_text, timestamp_from_epoch, ClientEvent, DisconnectReason},
        types::GroupInfo,
    },
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest<'a> {
    pub client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest<'a> {
    pub chat_id: &'a ChatId,
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ExportSessionResponse {
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GroupsResponse {
    #[serde(default)]
    pub groups: Vec<GroupInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(alias = "message")]
    pub error: String,
}

/// One long-poll page. `cursor` is passed back as `after` on the next poll.
#[derive(Debug, Deserialize)]
pub struct EventBatch {
    pub cursor: u64,
    #[serde(default)]
    pub events: Vec<GatewayEvent>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    Qr {
        qr: String,
    },
    Authenticated,
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    Ready,
    Message {
        id: String,
        #[serde(rename = "chatId")]
        chat_id: String,
        #[serde(default)]
        from: String,
        /// Epoch seconds.
        timestamp: i64,
        #[serde(default)]
        body: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    /// Event kinds this adapter does not consume (acks, typing, ...).
    #[serde(other)]
    Unknown,
}

impl GatewayEvent {
    /// Convert to a coordinator event. Non-text and unknown events yield `None`.
    pub fn into_client_event(self) -> Option<ClientEvent> {
        match self {
            Self::Qr { qr } => Some(ClientEvent::Qr(qr)),
            Self::Authenticated => Some(ClientEvent::Authenticated),
            Self::AuthFailure { message } => Some(ClientEvent::AuthFailure(message)),
            Self::Ready => Some(ClientEvent::Ready),
            Self::Message {
                id,
                chat_id,
                from,
                timestamp,
                body,
            } => {
                if body.trim().is_empty() {
                    return None;
                }
                Some(ClientEvent::Message(inbound_text(
                    &id,
                    &chat_id,
                    &from,
                    timestamp_from_epoch(timestamp),
                    &body,
                )))
            }
            Self::Disconnected { reason } => {
                Some(ClientEvent::Disconnected(DisconnectReason::from_wire(&reason)))
            }
            Self::Unknown => None,
        }
    }
}
