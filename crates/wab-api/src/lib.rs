//! Private HTTP API of the bot (axum). This is the surface the relay proxy exposes
//! to the web client.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::app;
pub use state::ApiState;

/// Bind `addr` and serve until `shutdown` fires.
pub async fn serve(addr: SocketAddr, state: ApiState, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, auth = state.token.is_some(), "bot api listening");
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
