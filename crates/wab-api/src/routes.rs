use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    handlers::{
        groups, health, logout, qr, reconnect, reload_settings, require_token, send_handoff,
        status,
    },
    state::ApiState,
};

pub fn app(state: ApiState) -> Router {
    let protected = Router::new()
        .route("/status", get(status))
        .route("/qr", get(qr))
        .route("/groups", get(groups))
        .route("/handoff", post(send_handoff))
        .route("/logout", post(logout))
        .route("/reconnect", post(reconnect))
        .route("/settings/reload", post(reload_settings))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}
