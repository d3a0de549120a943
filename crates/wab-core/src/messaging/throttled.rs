use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound sends.
    pub global_min_interval: Duration,
    /// Minimum spacing between sends to the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // WhatsApp flags bursts from linked devices.
        Self {
            global_min_interval: Duration::from_millis(250),
            per_chat_min_interval: Duration::from_millis(1500),
        }
    }
}

/// Earliest permitted send instants, global and per chat.
#[derive(Debug)]
struct Pacer {
    cfg: ThrottleConfig,
    global_free_at: Instant,
    chat_free_at: HashMap<ChatId, Instant>,
}

impl Pacer {
    fn new(cfg: ThrottleConfig) -> Self {
        Self {
            cfg,
            global_free_at: Instant::now(),
            chat_free_at: HashMap::new(),
        }
    }

    /// Book a send slot for `chat` at or after `now` and return its start.
    fn book(&mut self, chat: &ChatId, now: Instant) -> Instant {
        // Entries in the past carry no information.
        self.chat_free_at.retain(|_, at| *at > now);

        let chat_free = self.chat_free_at.get(chat).copied().unwrap_or(now);
        let slot = now.max(self.global_free_at).max(chat_free);

        self.global_free_at = slot + self.cfg.global_min_interval;
        self.chat_free_at
            .insert(chat.clone(), slot + self.cfg.per_chat_min_interval);
        slot
    }
}

/// MessagingPort decorator that spaces outbound sends globally and per chat.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    pacer: Mutex<Pacer>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            pacer: Mutex::new(Pacer::new(cfg)),
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<MessageRef> {
        let now = Instant::now();
        let slot = self.pacer.lock().await.book(chat_id, now);
        if slot > now {
            tracing::debug!(
                chat = %chat_id,
                wait_ms = (slot - now).as_millis() as u64,
                "pacing outbound send"
            );
            sleep_until(slot).await;
        }
        self.inner.send_text(chat_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<(ChatId, String, Instant)>>,
    }

    #[async_trait::async_trait]
    impl MessagingPort for Recorder {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                max_message_len: 4096,
            }
        }

        async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<MessageRef> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.clone(), text.to_string(), Instant::now()));
            Ok(MessageRef {
                chat_id: chat_id.clone(),
                message_id: MessageId("m".into()),
            })
        }
    }

    fn cfg(global_ms: u64, chat_ms: u64) -> ThrottleConfig {
        ThrottleConfig {
            global_min_interval: Duration::from_millis(global_ms),
            per_chat_min_interval: Duration::from_millis(chat_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_books_slots_on_both_limits() {
        let mut pacer = Pacer::new(cfg(100, 1000));
        let a = ChatId("a@g.us".into());
        let b = ChatId("b@g.us".into());
        let now = Instant::now();

        assert_eq!(pacer.book(&a, now), now);
        // Other chat only waits for the global gap.
        assert_eq!(pacer.book(&b, now), now + Duration::from_millis(100));
        // Same chat waits for its own gap.
        assert_eq!(pacer.book(&a, now), now + Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn second_send_to_same_chat_waits_for_interval() {
        let inner = Arc::new(Recorder::default());
        let throttled = ThrottledMessenger::new(inner.clone(), cfg(0, 1000));
        let chat = ChatId("g1@g.us".into());

        let start = Instant::now();
        throttled.send_text(&chat, "a").await.unwrap();
        throttled.send_text(&chat, "b").await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(1));
        let sent = inner.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn different_chats_only_respect_global_spacing() {
        let inner = Arc::new(Recorder::default());
        let throttled = ThrottledMessenger::new(inner.clone(), cfg(200, 5000));

        let start = Instant::now();
        throttled.send_text(&ChatId("a@g.us".into()), "a").await.unwrap();
        throttled.send_text(&ChatId("b@g.us".into()), "b").await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(5));
    }
}
