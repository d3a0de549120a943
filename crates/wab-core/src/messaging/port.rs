use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::MessagingCapabilities,
    Result,
};

/// Outbound messaging port.
///
/// WhatsApp (through the gateway adapter) is the only implementation today; the
/// coordinator only ever sees this trait.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Send a plain text message (WhatsApp markdown: `*bold*`, `_italic_`).
    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<MessageRef>;
}
