use std::{net::SocketAddr, time::Duration};

use crate::error::ProxyError;

pub const DEFAULT_MOUNT_PREFIX: &str = "/.netlify/functions/whatsapp-proxy";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_ADDR: &str = "0.0.0.0:8888";

// Checked in order; the first non-empty value wins.
const BASE_URL_VARS: [&str; 3] = ["BOT_BASE_URL", "WHATSAPP_BOT_URL", "WHATSAPP_BOT_BASE_URL"];

#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Bot private API root. `None` makes every forwarded request fail with 500.
    pub base_url: Option<String>,
    pub mount_prefix: String,
    pub upstream_timeout: Duration,
    pub listen_addr: SocketAddr,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ProxyError> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ProxyError::Config(format!(".env: {e}"))),
        }
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ProxyError> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = BASE_URL_VARS.iter().find_map(|k| get(k));

        let mount_prefix = get("PROXY_MOUNT_PREFIX")
            .unwrap_or_else(|| DEFAULT_MOUNT_PREFIX.to_string())
            .trim_end_matches('/')
            .to_string();

        let timeout_ms = match get("PROXY_UPSTREAM_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ProxyError::Config(format!("PROXY_UPSTREAM_TIMEOUT_MS must be a number, got {raw:?}")))?,
            None => DEFAULT_TIMEOUT_MS,
        };

        let addr_raw = get("PROXY_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let listen_addr = addr_raw
            .parse()
            .map_err(|_| ProxyError::Config(format!("PROXY_ADDR is not a socket address: {addr_raw:?}")))?;

        Ok(Self {
            base_url,
            mount_prefix,
            upstream_timeout: Duration::from_millis(timeout_ms),
            listen_addr,
        })
    }

    /// Upstream path for an incoming request path: mount prefix stripped, never empty.
    pub fn upstream_path<'a>(&self, path: &'a str) -> &'a str {
        let stripped = if self.mount_prefix.is_empty() {
            path
        } else {
            path.strip_prefix(self.mount_prefix.as_str()).unwrap_or(path)
        };
        if stripped.is_empty() {
            "/"
        } else {
            stripped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(vars: &[(&str, &str)]) -> Result<ProxyConfig, ProxyError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ProxyConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn base_url_falls_back_through_aliases() {
        assert_eq!(cfg(&[]).unwrap().base_url, None);
        assert_eq!(
            cfg(&[("WHATSAPP_BOT_BASE_URL", "http://c"), ("WHATSAPP_BOT_URL", "http://b")])
                .unwrap()
                .base_url
                .as_deref(),
            Some("http://b")
        );
        assert_eq!(
            cfg(&[("BOT_BASE_URL", "http://a"), ("WHATSAPP_BOT_URL", "http://b")])
                .unwrap()
                .base_url
                .as_deref(),
            Some("http://a")
        );
        assert_eq!(
            cfg(&[("BOT_BASE_URL", "  "), ("WHATSAPP_BOT_URL", "http://b")])
                .unwrap()
                .base_url
                .as_deref(),
            Some("http://b")
        );
    }

    #[test]
    fn defaults() {
        let c = cfg(&[]).unwrap();
        assert_eq!(c.mount_prefix, DEFAULT_MOUNT_PREFIX);
        assert_eq!(c.upstream_timeout, Duration::from_millis(15_000));
        assert_eq!(c.listen_addr.port(), 8888);
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        assert!(matches!(
            cfg(&[("PROXY_UPSTREAM_TIMEOUT_MS", "soon")]),
            Err(ProxyError::Config(_))
        ));
    }

    #[test]
    fn strips_mount_prefix() {
        let c = cfg(&[]).unwrap();
        assert_eq!(c.upstream_path("/.netlify/functions/whatsapp-proxy/status"), "/status");
        assert_eq!(c.upstream_path("/.netlify/functions/whatsapp-proxy"), "/");
        assert_eq!(c.upstream_path("/handoff"), "/handoff");
        assert_eq!(c.upstream_path(""), "/");
    }
}
