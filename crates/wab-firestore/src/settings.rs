use async_trait::async_trait;

use wab_core::{
    settings::{BotSettings, SettingsSource},
    Result,
};

use crate::FirestoreClient;

pub const DEFAULT_SETTINGS_DOCUMENT: &str = "settings/whatsapp_bot";

/// Reads the bot settings document edited from the census application.
///
/// A missing document yields `fallback` (usually built from env vars).
#[derive(Clone)]
pub struct FirestoreSettingsSource {
    client: FirestoreClient,
    path: String,
    fallback: BotSettings,
}

impl FirestoreSettingsSource {
    pub fn new(client: FirestoreClient, fallback: BotSettings) -> Self {
        Self {
            client,
            path: DEFAULT_SETTINGS_DOCUMENT.to_string(),
            fallback,
        }
    }
}

#[async_trait]
impl SettingsSource for FirestoreSettingsSource {
    async fn load(&self) -> Result<BotSettings> {
        match self.client.get::<BotSettings>(&self.path).await? {
            Some(settings) => Ok(settings),
            None => {
                tracing::debug!(path = %self.path, "settings document missing; using fallback");
                Ok(self.fallback.clone())
            }
        }
    }
}
