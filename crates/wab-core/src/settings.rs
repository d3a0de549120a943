//! Runtime bot settings document shared with the census application.
//!
//! Wire shape (camelCase):
//! `{ enabled, status, shiftParser: { enabled, sourceGroupId }, handoffNotifications: { enabled, targetGroupId, autoSendTime } }`.
//! Every field is optional; a missing document means "everything disabled".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{domain::ChatId, scheduler::DailyTime, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BotSettings {
    pub enabled: bool,
    pub status: Option<String>,
    pub shift_parser: ShiftParserSettings,
    pub handoff_notifications: HandoffNotificationSettings,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShiftParserSettings {
    pub enabled: bool,
    pub source_group_id: Option<ChatId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HandoffNotificationSettings {
    pub enabled: bool,
    pub target_group_id: Option<ChatId>,
    /// `HH:MM`, local time. Absent disables automatic sends.
    pub auto_send_time: Option<String>,
}

impl BotSettings {
    /// Group whose messages should be parsed, if parsing is active.
    pub fn shift_source(&self) -> Option<&ChatId> {
        if !self.enabled || !self.shift_parser.enabled {
            return None;
        }
        self.shift_parser
            .source_group_id
            .as_ref()
            .filter(|id| !id.0.trim().is_empty())
    }

    /// Group that receives handoff notifications, if notifications are active.
    pub fn handoff_target(&self) -> Option<&ChatId> {
        if !self.enabled || !self.handoff_notifications.enabled {
            return None;
        }
        self.handoff_notifications
            .target_group_id
            .as_ref()
            .filter(|id| !id.0.trim().is_empty())
    }

    /// Daily automatic send time, if notifications are active and the time parses.
    pub fn auto_send_time(&self) -> Option<DailyTime> {
        self.handoff_target()?;
        let raw = self.handoff_notifications.auto_send_time.as_deref()?;
        match DailyTime::parse(raw) {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!(value = raw, error = %e, "ignoring invalid autoSendTime");
                None
            }
        }
    }
}

/// Where settings come from (shared config store, or static env fallback).
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load(&self) -> Result<BotSettings>;
}

/// Fixed settings, built from environment variables when no shared config store is configured.
#[derive(Clone, Debug)]
pub struct StaticSettingsSource {
    settings: BotSettings,
}

impl StaticSettingsSource {
    pub fn new(settings: BotSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SettingsSource for StaticSettingsSource {
    async fn load(&self) -> Result<BotSettings> {
        Ok(self.settings.clone())
    }
}
