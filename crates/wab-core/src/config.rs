use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    domain::ChatId,
    errors::Error,
    messaging::throttled::ThrottleConfig,
    settings::{BotSettings, HandoffNotificationSettings, ShiftParserSettings},
    Result,
};

/// Which backend holds the client session blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionBackend {
    File,
    Memory,
    Firestore,
    Postgres,
}

impl FromStr for SessionBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            "firestore" => Ok(Self::Firestore),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(Error::Config(format!(
                "SESSION_STORE must be one of file, memory, firestore, postgres (got {other:?})"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// OAuth bearer token; `None` against the emulator.
    pub token: Option<String>,
    pub base_url: String,
}

/// Typed runtime configuration of the bot binary.
#[derive(Clone, Debug)]
pub struct Config {
    // Client
    pub client_id: String,
    pub gateway_url: String,
    pub gateway_token: Option<String>,

    // Session store
    pub session_backend: SessionBackend,
    pub session_dir: PathBuf,
    pub session_collection: String,
    pub database_url: Option<String>,
    pub firestore: Option<FirestoreConfig>,

    // Private API
    pub api_addr: SocketAddr,
    pub api_token: Option<String>,

    // Timers
    pub session_backup_interval: Duration,
    pub reconnect_delay: Duration,
    pub settings_refresh: Duration,

    pub throttle: ThrottleConfig,

    /// Used when no shared settings document is available.
    pub fallback_settings: BotSettings,
}

impl Config {
    /// Load from the process environment, after reading `.env` if present.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!(".env: {e}"))),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let client_id = get("WHATSAPP_CLIENT_ID").unwrap_or_else(|| "hhr-bot".to_string());

        let gateway_url = get("GATEWAY_URL").ok_or_else(|| {
            Error::Config("GATEWAY_URL environment variable is required".to_string())
        })?;
        let gateway_token = get("GATEWAY_TOKEN");

        let session_backend = get("SESSION_STORE")
            .map(|v| v.parse::<SessionBackend>())
            .transpose()?
            .unwrap_or(SessionBackend::File);
        let session_dir = PathBuf::from(get("SESSION_DIR").unwrap_or_else(|| ".wab-sessions".to_string()));
        let session_collection =
            get("SESSION_COLLECTION").unwrap_or_else(|| "whatsapp_sessions".to_string());
        let database_url = get("DATABASE_URL");

        let firestore = get("FIRESTORE_PROJECT_ID").map(|project_id| FirestoreConfig {
            project_id,
            token: get("FIRESTORE_TOKEN"),
            base_url: get("FIRESTORE_BASE_URL")
                .unwrap_or_else(|| "https://firestore.googleapis.com/v1".to_string()),
        });

        match session_backend {
            SessionBackend::Postgres if database_url.is_none() => {
                return Err(Error::Config(
                    "DATABASE_URL is required when SESSION_STORE=postgres".to_string(),
                ));
            }
            SessionBackend::Firestore if firestore.is_none() => {
                return Err(Error::Config(
                    "FIRESTORE_PROJECT_ID is required when SESSION_STORE=firestore".to_string(),
                ));
            }
            _ => {}
        }

        let api_addr = match get("BOT_API_ADDR") {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .map_err(|e| Error::Config(format!("BOT_API_ADDR {raw:?}: {e}")))?,
            None => SocketAddr::from(([0, 0, 0, 0], 3001)),
        };
        let api_token = get("BOT_API_TOKEN");

        let session_backup_interval =
            Duration::from_millis(parse_u64(&get, "SESSION_BACKUP_INTERVAL_MS")?.unwrap_or(60_000).max(1_000));
        let reconnect_delay =
            Duration::from_millis(parse_u64(&get, "RECONNECT_DELAY_MS")?.unwrap_or(5_000));
        let settings_refresh =
            Duration::from_secs(parse_u64(&get, "SETTINGS_REFRESH_SECS")?.unwrap_or(300).max(1));

        let defaults = ThrottleConfig::default();
        let throttle = ThrottleConfig {
            global_min_interval: parse_u64(&get, "SEND_GLOBAL_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.global_min_interval),
            per_chat_min_interval: parse_u64(&get, "SEND_PER_CHAT_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.per_chat_min_interval),
        };

        let fallback_settings = fallback_settings(
            get("SHIFT_SOURCE_GROUP_ID"),
            get("HANDOFF_TARGET_GROUP_ID"),
            get("HANDOFF_AUTO_SEND_TIME"),
        );

        Ok(Self {
            client_id,
            gateway_url,
            gateway_token,
            session_backend,
            session_dir,
            session_collection,
            database_url,
            firestore,
            api_addr,
            api_token,
            session_backup_interval,
            reconnect_delay,
            settings_refresh,
            throttle,
            fallback_settings,
        })
    }
}

/// Env-only settings: a feature is enabled exactly when its group id is set.
fn fallback_settings(
    source: Option<String>,
    target: Option<String>,
    auto_send_time: Option<String>,
) -> BotSettings {
    BotSettings {
        enabled: source.is_some() || target.is_some(),
        status: None,
        shift_parser: ShiftParserSettings {
            enabled: source.is_some(),
            source_group_id: source.map(ChatId),
        },
        handoff_notifications: HandoffNotificationSettings {
            enabled: target.is_some(),
            target_group_id: target.map(ChatId),
            auto_send_time,
        },
    }
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    get(key)
        .map(|raw| {
            raw.parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must be a non-negative integer (got {raw:?})")))
        })
        .transpose()
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::scheduler::DailyTime;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = load(&[("GATEWAY_URL", "http://gw:8080")]).unwrap();
        assert_eq!(cfg.client_id, "hhr-bot");
        assert_eq!(cfg.session_backend, SessionBackend::File);
        assert_eq!(cfg.session_collection, "whatsapp_sessions");
        assert_eq!(cfg.api_addr.port(), 3001);
        assert_eq!(cfg.session_backup_interval, Duration::from_secs(60));
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(5));
        assert_eq!(cfg.settings_refresh, Duration::from_secs(300));
        assert!(!cfg.fallback_settings.enabled);
    }

    #[test]
    fn gateway_url_is_required() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("GATEWAY_URL"));
        assert!(load(&[("GATEWAY_URL", "   ")]).is_err());
    }

    #[test]
    fn backend_requirements_fail_fast() {
        assert!(load(&[("GATEWAY_URL", "http://gw"), ("SESSION_STORE", "postgres")]).is_err());
        assert!(load(&[("GATEWAY_URL", "http://gw"), ("SESSION_STORE", "firestore")]).is_err());
        assert!(load(&[("GATEWAY_URL", "http://gw"), ("SESSION_STORE", "redis")]).is_err());

        let cfg = load(&[
            ("GATEWAY_URL", "http://gw"),
            ("SESSION_STORE", "Postgres"),
            ("DATABASE_URL", "postgres://localhost/wab"),
        ])
        .unwrap();
        assert_eq!(cfg.session_backend, SessionBackend::Postgres);
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let err = load(&[("GATEWAY_URL", "http://gw"), ("RECONNECT_DELAY_MS", "soon")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn fallback_settings_follow_group_ids() {
        let cfg = load(&[
            ("GATEWAY_URL", "http://gw"),
            ("HANDOFF_TARGET_GROUP_ID", "222@g.us"),
            ("HANDOFF_AUTO_SEND_TIME", "08:30"),
        ])
        .unwrap();
        let s = &cfg.fallback_settings;
        assert!(s.shift_source().is_none());
        assert_eq!(s.handoff_target(), Some(&ChatId("222@g.us".into())));
        assert_eq!(s.auto_send_time(), Some(DailyTime { hour: 8, minute: 30 }));
    }
}
