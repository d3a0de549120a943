//! Background task that long-polls the gateway and feeds `ClientEvent`s to the bot.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use wab_core::messaging::client::ClientEvent;

use crate::GatewayClient;

const POLL_WAIT: Duration = Duration::from_secs(25);
const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct EventPump {
    client: GatewayClient,
    events: mpsc::Sender<ClientEvent>,
    poll_wait: Duration,
}

impl EventPump {
    pub fn new(client: GatewayClient, events: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            client,
            events,
            poll_wait: POLL_WAIT,
        }
    }

    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait;
        self
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Poll until cancelled or until the bot drops its receiver.
    ///
    /// Events are forwarded in gateway order; the cursor only advances after a
    /// page has been fully delivered.
    pub async fn run(self, cancel: CancellationToken) {
        let mut cursor = 0u64;
        let mut backoff = MIN_BACKOFF;

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.client.poll_events(cursor, self.poll_wait) => res,
            };

            let batch = match batch {
                Ok(b) => {
                    backoff = MIN_BACKOFF;
                    b
                }
                Err(e) => {
                    tracing::warn!(error = %e, retry_in_ms = backoff.as_millis() as u64, "gateway event poll failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            for ev in batch.events {
                let Some(ev) = ev.into_client_event() else {
                    continue;
                };
                if self.events.send(ev).await.is_err() {
                    tracing::debug!("event receiver dropped; pump stopping");
                    return;
                }
            }
            cursor = batch.cursor.max(cursor);
        }
        tracing::debug!("gateway event pump stopped");
    }
}
