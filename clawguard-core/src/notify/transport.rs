//! The chat transport seam.
//!
//! The notifier speaks to the outside world through [`ChatTransport`];
//! concrete transports (Telegram in `clawguard-telegram`, a mock in
//! `test_utils`) implement it. Inbound traffic arrives as [`ChatEvent`]
//! values fed to the notifier by the transport's polling loop.

use async_trait::async_trait;
use thiserror::Error;

/// Failures raised by a concrete chat transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not reach the chat service.
    #[error("chat transport unreachable: {0}")]
    Network(String),

    /// The chat service rejected the call.
    #[error("chat API error: {0}")]
    Api(String),
}

/// One tappable choice attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAction {
    /// Button caption.
    pub label: String,

    /// Opaque payload echoed back in the matching [`ChatEvent::Choice`].
    pub data: String,
}

/// Address of a sent prompt, used for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Inbound traffic from the chat side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A text command such as `/pair <secret>`.
    Command {
        chat_id: i64,
        sender_name: String,
        text: String,
    },

    /// A tapped prompt button.
    Choice {
        chat_id: i64,
        sender_name: String,
        /// Transport-level id used to acknowledge the tap.
        choice_id: String,
        /// The payload from [`PromptAction::data`].
        data: String,
    },
}

/// Outbound chat operations the notifier needs.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send an approval prompt with its choice buttons.
    async fn send_prompt(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[PromptAction],
    ) -> Result<MessageRef, TransportError>;

    /// Rewrite a previously sent prompt (also drops its buttons).
    async fn edit_prompt(&self, message: &MessageRef, text: &str) -> Result<(), TransportError>;

    /// Acknowledge a tapped choice with a short notice to the tapper.
    async fn ack_choice(&self, choice_id: &str, text: &str) -> Result<(), TransportError>;

    /// Send a plain text message (pairing replies and the like).
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError>;
}
