use wab_core::bot::BotHandle;

// Application state shared by every handler.
#[derive(Clone)]
pub struct ApiState {
    pub bot: BotHandle,
    /// Bearer token required on every route except `/health`, when set.
    pub token: Option<String>,
}

impl ApiState {
    pub fn new(bot: BotHandle, token: Option<String>) -> Self {
        Self { bot, token }
    }
}
