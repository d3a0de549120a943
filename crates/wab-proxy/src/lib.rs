//! Stateless HTTP relay exposing the bot's private API to the web client.
//!
//! Every request is forwarded to the configured bot base URL with the mount
//! prefix stripped. Only `Content-Type` and `Authorization` cross the relay;
//! responses come back verbatim with permissive CORS headers attached.

use axum::{middleware, Router};

pub mod config;
pub mod error;
pub mod relay;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use relay::ProxyState;

pub fn app(cfg: ProxyConfig) -> Result<Router, ProxyError> {
    let state = ProxyState::new(cfg)?;
    Ok(Router::new()
        .fallback(relay::relay)
        .layer(middleware::map_response(relay::with_cors))
        .with_state(state))
}
