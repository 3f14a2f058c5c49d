//! [`ChatTransport`] implementation over the Bot API client, plus the
//! long-poll loop that feeds inbound updates to the notifier.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use clawguard_core::notify::{
    ChatEvent, ChatTransport, MessageRef, Notifier, PromptAction, TransportError,
};

use crate::client::TelegramClient;
use crate::error::TelegramError;
use crate::types::{InlineKeyboardButton, InlineKeyboardMarkup, Update};

/// Buttons per keyboard row.
const KEYBOARD_ROW_WIDTH: usize = 3;

/// Backoff after a failed poll.
const POLL_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

/// Telegram-backed chat transport.
pub struct TelegramTransport {
    client: Arc<TelegramClient>,
}

impl TelegramTransport {
    pub fn new(client: Arc<TelegramClient>) -> Self {
        Self { client }
    }
}

impl From<TelegramError> for TransportError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::Http(e) => TransportError::Network(e.to_string()),
            TelegramError::Api(msg) => TransportError::Api(msg),
            TelegramError::Json(e) => TransportError::Api(e.to_string()),
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_prompt(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[PromptAction],
    ) -> Result<MessageRef, TransportError> {
        let markup = keyboard(actions);
        let message = self
            .client
            .send_message(chat_id, text, Some(&markup))
            .await?;
        Ok(MessageRef {
            chat_id: message.chat.id,
            message_id: message.message_id,
        })
    }

    async fn edit_prompt(&self, message: &MessageRef, text: &str) -> Result<(), TransportError> {
        self.client
            .edit_message_text(message.chat_id, message.message_id, text)
            .await?;
        Ok(())
    }

    async fn ack_choice(&self, choice_id: &str, text: &str) -> Result<(), TransportError> {
        self.client.answer_callback_query(choice_id, text).await?;
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.client.send_message(chat_id, text, None).await?;
        Ok(())
    }
}

fn keyboard(actions: &[PromptAction]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: actions
            .chunks(KEYBOARD_ROW_WIDTH)
            .map(|row| {
                row.iter()
                    .map(|action| InlineKeyboardButton {
                        text: action.label.clone(),
                        callback_data: action.data.clone(),
                    })
                    .collect()
            })
            .collect(),
    }
}

/// Poll `getUpdates` and feed each update to the notifier until the
/// shutdown flag flips.
pub async fn run_update_loop(
    client: Arc<TelegramClient>,
    notifier: Arc<Notifier>,
    mut shutdown: watch::Receiver<bool>,
    poll_timeout_secs: u64,
) {
    let mut offset: Option<i64> = None;
    tracing::info!("telegram update loop started");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let polled = tokio::select! {
            _ = shutdown.changed() => break,
            result = client.get_updates(offset, poll_timeout_secs) => result,
        };
        match polled {
            Ok(updates) => {
                for update in updates {
                    offset = Some(update.update_id + 1);
                    if let Some(event) = event_from_update(update) {
                        notifier.handle_event(event).await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "telegram polling failed");
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                }
            }
        }
    }
    tracing::info!("telegram update loop stopped");
}

/// Map one Bot API update onto the notifier's event model.
///
/// Commands are keyed by the chat they arrived in; choices by the
/// identity of the tapper, which is what pairing verifies.
fn event_from_update(update: Update) -> Option<ChatEvent> {
    if let Some(cq) = update.callback_query {
        return Some(ChatEvent::Choice {
            chat_id: cq.from.id,
            sender_name: cq.from.display_name(),
            choice_id: cq.id,
            data: cq.data?,
        });
    }
    let message = update.message?;
    let text = message.text?;
    if !text.starts_with('/') {
        return None;
    }
    let sender_name = message
        .from
        .map(|u| u.display_name())
        .unwrap_or_else(|| "unknown".to_string());
    Some(ChatEvent::Command {
        chat_id: message.chat.id,
        sender_name,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_json(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_command_event_from_message() {
        let update = update_json(
            r#"{"update_id": 1, "message": {
                "message_id": 2,
                "from": {"id": 42, "first_name": "Alice", "username": "alice"},
                "chat": {"id": 42},
                "text": "/pair s3cret"
            }}"#,
        );
        let event = event_from_update(update).unwrap();
        assert_eq!(
            event,
            ChatEvent::Command {
                chat_id: 42,
                sender_name: "alice".to_string(),
                text: "/pair s3cret".to_string(),
            }
        );
    }

    #[test]
    fn test_choice_event_is_keyed_by_tapper() {
        let update = update_json(
            r#"{"update_id": 3, "callback_query": {
                "id": "cb-9",
                "from": {"id": 42, "first_name": "Alice"},
                "message": {"message_id": 5, "chat": {"id": -100}},
                "data": "approve_1h:00000000-0000-0000-0000-000000000000"
            }}"#,
        );
        let event = event_from_update(update).unwrap();
        match event {
            ChatEvent::Choice { chat_id, data, .. } => {
                assert_eq!(chat_id, 42);
                assert!(data.starts_with("approve_1h:"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_and_empty_updates_are_ignored() {
        let update = update_json(
            r#"{"update_id": 4, "message": {
                "message_id": 6,
                "chat": {"id": 42},
                "text": "hello"
            }}"#,
        );
        assert!(event_from_update(update).is_none());

        let update = update_json(r#"{"update_id": 5}"#);
        assert!(event_from_update(update).is_none());
    }

    #[test]
    fn test_keyboard_rows_are_chunked() {
        let actions: Vec<PromptAction> = (0..6)
            .map(|i| PromptAction {
                label: format!("b{i}"),
                data: format!("d{i}"),
            })
            .collect();
        let markup = keyboard(&actions);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 3);
        assert_eq!(markup.inline_keyboard[1][2].callback_data, "d5");
    }
}
