use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use wab_core::{
    bot::BotStatus,
    domain::{ChatId, MessageId},
    handoff::HandoffNotification,
    messaging::types::GroupInfo,
    settings::BotSettings,
};

use crate::{error::ApiError, state::ApiState};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: BotStatus,
    pub settings: BotSettings,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffSentResponse {
    pub sent: bool,
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

#[derive(Debug, Serialize)]
pub struct GroupsResponse {
    pub groups: Vec<GroupInfo>,
}

// Rejects requests without the configured bearer token.
pub async fn require_token(
    State(state): State<ApiState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.token.as_deref() else {
        return Ok(next.run(req).await);
    };
    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if provided != Some(expected) {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }
    Ok(next.run(req).await)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.bot.status(),
        settings: state.bot.settings(),
    })
}

pub async fn qr(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let status = state.bot.status();
    match status.connection.qr() {
        Some(qr) => Ok(Json(json!({ "qr": qr }))),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, "No QR code pending")
            .with_details(format!("connection state is {}", status.connection.name()))),
    }
}

pub async fn groups(State(state): State<ApiState>) -> Result<Json<GroupsResponse>, ApiError> {
    let groups = state.bot.list_groups().await?;
    Ok(Json(GroupsResponse { groups }))
}

pub async fn send_handoff(
    State(state): State<ApiState>,
    payload: Result<Json<HandoffNotification>, JsonRejection>,
) -> Result<Json<HandoffSentResponse>, ApiError> {
    let Json(notification) = payload.map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, "Invalid handoff payload").with_details(e.body_text())
    })?;

    let sent = state.bot.send_handoff(notification).await?;
    Ok(Json(HandoffSentResponse {
        sent: true,
        chat_id: sent.chat_id,
        message_id: sent.message_id,
    }))
}

pub async fn logout(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    state.bot.logout().await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn reconnect(State(state): State<ApiState>) -> Result<Response, ApiError> {
    state.bot.reconnect().await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))).into_response())
}

pub async fn reload_settings(State(state): State<ApiState>) -> Result<Json<BotSettings>, ApiError> {
    Ok(Json(state.bot.reload_settings().await?))
}
