use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use wab_core::Error;

/// JSON error envelope: `{ "error": ..., "details"?: ... }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.body.details = Some(details.into());
        self
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::NotConnected => Self::new(StatusCode::CONFLICT, "WhatsApp client is not connected"),
            Error::Disabled(msg) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "Handoff notifications unavailable").with_details(msg)
            }
            Error::Stopped => Self::new(StatusCode::SERVICE_UNAVAILABLE, "Bot is shutting down"),
            Error::External(msg) => Self::new(StatusCode::BAD_GATEWAY, "WhatsApp client request failed").with_details(msg),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal error").with_details(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
