//! Telegram Bot API client

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::TelegramError;
use crate::types::{ApiResponse, InlineKeyboardMarkup, Message, Update};

/// Default API base URL
const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Headroom added to the long-poll window before the HTTP client
/// gives up on a `getUpdates` call.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Thin client over the Bot API methods the gateway uses.
///
/// # Example
///
/// ```rust,no_run
/// use clawguard_telegram::TelegramClient;
///
/// let client = TelegramClient::new("123456:bot-token");
/// ```
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    /// Create a client for the given bot token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_API_BASE.to_string(),
            token: token.into(),
        }
    }

    /// Override the API base URL (for tests against a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let payload = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        self.call_with_timeout(
            "getUpdates",
            &payload,
            Duration::from_secs(timeout_secs) + POLL_GRACE,
        )
        .await
    }

    /// Send a message, optionally with an inline keyboard.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, TelegramError> {
        let mut payload = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = serde_json::to_value(markup)?;
        }
        self.call("sendMessage", &payload).await
    }

    /// Rewrite the text of a sent message (this also drops its
    /// inline keyboard).
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), TelegramError> {
        let payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        // The API answers with the edited Message or `true`.
        let _: serde_json::Value = self.call("editMessageText", &payload).await?;
        Ok(())
    }

    /// Acknowledge a callback query with a short notice.
    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: &str,
    ) -> Result<(), TelegramError> {
        let payload = json!({ "callback_query_id": callback_query_id, "text": text });
        let _: serde_json::Value = self.call("answerCallbackQuery", &payload).await?;
        Ok(())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
    ) -> Result<T, TelegramError> {
        self.call_with_timeout(method, payload, Duration::from_secs(30))
            .await
    }

    async fn call_with_timeout<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T, TelegramError> {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await?;
        let api: ApiResponse<T> = response.json().await?;
        if !api.ok {
            return Err(TelegramError::Api(
                api.description
                    .unwrap_or_else(|| format!("{method} failed")),
            ));
        }
        api.result
            .ok_or_else(|| TelegramError::Api(format!("{method}: empty result")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InlineKeyboardButton;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> TelegramClient {
        TelegramClient::new("TOKEN").with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_send_message_with_keyboard() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({"chat_id": 42})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 7, "chat": {"id": 42}}
            })))
            .mount(&server)
            .await;

        let markup = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: "Deny".to_string(),
                callback_data: "deny:x".to_string(),
            }]],
        };
        let message = client(&server)
            .await
            .send_message(42, "approve?", Some(&markup))
            .await
            .unwrap();
        assert_eq!(message.message_id, 7);
        assert_eq!(message.chat.id, 42);
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .send_message(42, "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, TelegramError::Api(msg) if msg.contains("chat not found")));
    }

    #[tokio::test]
    async fn test_get_updates_advances_through_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(json!({"offset": 11})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [{"update_id": 11, "message": {
                    "message_id": 1,
                    "from": {"id": 5, "first_name": "Bob"},
                    "chat": {"id": 5},
                    "text": "/status"
                }}]
            })))
            .mount(&server)
            .await;

        let updates = client(&server).await.get_updates(Some(11), 0).await.unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 11);
    }

    #[tokio::test]
    async fn test_answer_callback_query_tolerates_bool_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/answerCallbackQuery"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": true})),
            )
            .mount(&server)
            .await;

        client(&server)
            .await
            .answer_callback_query("cb-1", "Recorded")
            .await
            .unwrap();
    }
}
