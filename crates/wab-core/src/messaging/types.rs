use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChatId, MessageId};

/// Raw inbound text message from a chat the client is subscribed to.
///
/// Ephemeral: consumed once by the router/parser, never persisted verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: MessageId,
    pub group_id: ChatId,
    pub sender_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw_text: String,
}

/// A chat group visible to the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: ChatId,
    pub name: String,
    #[serde(default)]
    pub participants: Option<u32>,
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
}
