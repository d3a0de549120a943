use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("config error: {0}")]
    Config(String),

    #[error("BOT_BASE_URL environment variable is not configured")]
    NotConfigured,

    #[error("invalid base64 request body: {0}")]
    InvalidBody(#[from] base64::DecodeError),

    #[error("Failed to reach WhatsApp bot")]
    Unreachable(String),

    #[error("WhatsApp bot did not respond in time")]
    Timeout,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) | Self::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Unreachable(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Unreachable(e.to_string())
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::Unreachable(details) => json!({ "error": self.to_string(), "details": details }),
            Self::InvalidBody(e) => json!({ "error": "Invalid request body encoding", "details": e.to_string() }),
            _ => json!({ "error": self.to_string() }),
        };
        (self.status(), Json(body)).into_response()
    }
}
