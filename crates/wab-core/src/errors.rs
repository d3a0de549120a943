use std::path::PathBuf;

use crate::session_store::StoreError;

/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the coordinator
/// can tell fatal failures (config, auth) from ones it only logs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("client is not connected")]
    NotConnected,

    #[error("feature disabled: {0}")]
    Disabled(String),

    #[error("session store error: {0}")]
    Store(#[from] StoreError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),

    #[error("bot process stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, Error>;
