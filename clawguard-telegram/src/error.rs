//! Telegram client errors.

use thiserror::Error;

/// Errors raised by the Bot API client.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Transport-level failure talking to the API.
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered but refused the call.
    #[error("telegram API error: {0}")]
    Api(String),

    /// Payload could not be serialized.
    #[error("telegram payload error: {0}")]
    Json(#[from] serde_json::Error),
}
