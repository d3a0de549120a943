use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, MessageId},
    messaging::types::{GroupInfo, InboundMessage},
    session_store::SessionBlob,
    Result,
};

/// Events emitted by the messaging client.
///
/// The client library is callback driven; adapters turn each callback into one of
/// these and push it onto the coordinator's channel.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// A QR code must be scanned to link the device.
    Qr(String),
    /// Credentials were accepted (restored or freshly linked).
    Authenticated,
    /// The client rejected the restored or freshly scanned credentials.
    AuthFailure(String),
    /// The client is connected and can send/receive.
    Ready,
    Message(InboundMessage),
    Disconnected(DisconnectReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The linked device was removed or the session was logged out remotely.
    Logout,
    /// Any transport-level drop; the stored session should still be valid.
    Other(String),
}

impl DisconnectReason {
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LOGOUT" | "UNPAIRED" | "UNPAIRED_IDLE" => Self::Logout,
            _ => Self::Other(raw.to_string()),
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logout => f.write_str("logout"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Lifecycle port of the messaging client (connect, export/restore session, logout).
///
/// Sending lives on [`crate::messaging::port::MessagingPort`]; one adapter usually
/// implements both.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Start authentication. `Some(blob)` restores a stored session, `None`
    /// requests a fresh QR link. Progress is reported through [`ClientEvent`]s.
    async fn connect(&self, restore: Option<SessionBlob>) -> Result<()>;

    /// Export the current session for backup. `None` if the client has nothing to export yet.
    async fn export_session(&self) -> Result<Option<SessionBlob>>;

    async fn logout(&self) -> Result<()>;

    async fn list_groups(&self) -> Result<Vec<GroupInfo>>;
}

/// Helper for adapters that receive epoch seconds.
pub fn timestamp_from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

/// Convenience constructor used by adapters and tests.
pub fn inbound_text(
    message_id: &str,
    group_id: &str,
    sender_id: &str,
    timestamp: DateTime<Utc>,
    text: &str,
) -> InboundMessage {
    InboundMessage {
        message_id: MessageId(message_id.to_string()),
        group_id: ChatId(group_id.to_string()),
        sender_id: sender_id.to_string(),
        timestamp,
        raw_text: text.to_string(),
    }
}
