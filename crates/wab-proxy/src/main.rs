use anyhow::Context;
use tokio::net::TcpListener;

use wab_proxy::ProxyConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wab_core::logging::init("wab-proxy")?;

    let cfg = ProxyConfig::from_env()?;
    if cfg.base_url.is_none() {
        tracing::warn!("BOT_BASE_URL is not set; every forwarded request will fail");
    }

    let listener = TcpListener::bind(cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    tracing::info!(
        addr = %cfg.listen_addr,
        prefix = %cfg.mount_prefix,
        timeout_ms = cfg.upstream_timeout.as_millis() as u64,
        "relay proxy listening"
    );

    axum::serve(listener, wab_proxy::app(cfg)?)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
