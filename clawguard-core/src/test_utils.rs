//! Test utilities for clawguard-core.
//!
//! Provides a mock chat transport so approval flows can be exercised
//! without a real chat service. Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! clawguard-core = { version = "...", features = ["test-utils"] }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::notify::{ChatTransport, MessageRef, PromptAction, TransportError};

/// One prompt captured by [`MockChatTransport`].
#[derive(Debug, Clone)]
pub struct SentPrompt {
    pub chat_id: i64,
    pub text: String,
    pub actions: Vec<PromptAction>,
    pub message: MessageRef,
}

#[derive(Default)]
struct Inner {
    prompts: Vec<SentPrompt>,
    edits: Vec<(MessageRef, String)>,
    acks: Vec<(String, String)>,
    texts: Vec<(i64, String)>,
    fail_sends: bool,
    next_message_id: i64,
}

/// A chat transport that records every call instead of talking to a
/// real chat service.
///
/// # Example
///
/// ```rust
/// use clawguard_core::test_utils::MockChatTransport;
///
/// let transport = MockChatTransport::new();
/// assert!(transport.sent_prompts().is_empty());
///
/// // A transport whose sends always fail:
/// let broken = MockChatTransport::failing();
/// ```
#[derive(Clone, Default)]
pub struct MockChatTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockChatTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose outbound calls all fail.
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.inner.lock().fail_sends = true;
        mock
    }

    /// Every prompt sent so far, oldest first.
    pub fn sent_prompts(&self) -> Vec<SentPrompt> {
        self.inner.lock().prompts.clone()
    }

    /// Every prompt edit performed so far.
    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.inner.lock().edits.clone()
    }

    /// Every choice acknowledgment, as (choice id, text).
    pub fn acks(&self) -> Vec<(String, String)> {
        self.inner.lock().acks.clone()
    }

    /// Every plain text message, as (chat id, text).
    pub fn texts(&self) -> Vec<(i64, String)> {
        self.inner.lock().texts.clone()
    }

    /// Callback data of the button labelled `label` on the newest
    /// prompt.
    pub fn action_data(&self, label: &str) -> Option<String> {
        self.inner
            .lock()
            .prompts
            .last()?
            .actions
            .iter()
            .find(|a| a.label == label)
            .map(|a| a.data.clone())
    }

    fn check_failure(&self) -> Result<(), TransportError> {
        if self.inner.lock().fail_sends {
            Err(TransportError::Network("mock transport failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChatTransport for MockChatTransport {
    async fn send_prompt(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[PromptAction],
    ) -> Result<MessageRef, TransportError> {
        self.check_failure()?;
        let mut inner = self.inner.lock();
        inner.next_message_id += 1;
        let message = MessageRef {
            chat_id,
            message_id: inner.next_message_id,
        };
        inner.prompts.push(SentPrompt {
            chat_id,
            text: text.to_string(),
            actions: actions.to_vec(),
            message,
        });
        Ok(message)
    }

    async fn edit_prompt(&self, message: &MessageRef, text: &str) -> Result<(), TransportError> {
        self.check_failure()?;
        self.inner.lock().edits.push((*message, text.to_string()));
        Ok(())
    }

    async fn ack_choice(&self, choice_id: &str, text: &str) -> Result<(), TransportError> {
        self.inner
            .lock()
            .acks
            .push((choice_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.check_failure()?;
        self.inner.lock().texts.push((chat_id, text.to_string()));
        Ok(())
    }
}
