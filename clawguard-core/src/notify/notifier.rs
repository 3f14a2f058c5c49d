//! Approval prompts, pairing, and reply routing.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use super::transport::{ChatEvent, ChatTransport, MessageRef, PromptAction, TransportError};
use crate::approval::{Decision, PendingApproval, PendingRegistry, TtlTag};
use crate::audit::{AuditStore, AuditStoreError};
use crate::config::PairingConfig;

/// Wire action name for the deny button.
const DENY_ACTION: &str = "deny";

/// Failures surfaced to the approval coordinator.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Nobody is paired (and no fallback chat is configured), so the
    /// prompt cannot be delivered at all.
    #[error("no paired approver to notify")]
    NoPairedApprover,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("audit store error: {0}")]
    Store(#[from] AuditStoreError),
}

struct PromptState {
    messages: Vec<MessageRef>,
    text: String,
}

/// The out-of-band notifier.
///
/// Renders approval prompts onto the chat channel, enforces approver
/// pairing, and routes button taps back to the matching pending
/// approval. Owns no decision logic: whether a decision installs a
/// grant is the approval coordinator's business.
pub struct Notifier {
    transport: Arc<dyn ChatTransport>,
    store: Arc<AuditStore>,
    pending: Arc<PendingRegistry>,
    pairing: PairingConfig,
    fallback_chat: Option<i64>,
    prompts: Mutex<HashMap<Uuid, PromptState>>,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<AuditStore>,
        pending: Arc<PendingRegistry>,
        pairing: PairingConfig,
        fallback_chat: Option<i64>,
    ) -> Self {
        Self {
            transport,
            store,
            pending,
            pairing,
            fallback_chat,
            prompts: Mutex::new(HashMap::new()),
        }
    }

    /// Push an approval prompt for a pending request.
    ///
    /// The prompt goes to every paired approver plus the configured
    /// fallback chat. Succeeds when at least one copy was delivered.
    pub async fn dispatch_prompt(&self, request: &PendingApproval) -> Result<(), NotifyError> {
        let mut recipients: Vec<i64> = self
            .store
            .paired_approvers()?
            .into_iter()
            .map(|a| a.chat_id)
            .collect();
        if let Some(chat) = self.fallback_chat {
            if !recipients.contains(&chat) {
                recipients.push(chat);
            }
        }
        if recipients.is_empty() {
            return Err(NotifyError::NoPairedApprover);
        }

        let text = render_prompt(request);
        let actions = prompt_actions(request.id);

        let mut sent = Vec::new();
        let mut last_err = None;
        for chat_id in recipients {
            match self.transport.send_prompt(chat_id, &text, &actions).await {
                Ok(message) => sent.push(message),
                Err(e) => {
                    tracing::warn!(chat_id, error = %e, "failed to deliver approval prompt");
                    last_err = Some(e);
                }
            }
        }
        if sent.is_empty() {
            return Err(NotifyError::Transport(last_err.unwrap_or_else(|| {
                TransportError::Network("no prompt delivered".to_string())
            })));
        }

        self.prompts.lock().insert(
            request.id,
            PromptState {
                messages: sent,
                text,
            },
        );
        Ok(())
    }

    /// Handle one inbound chat event.
    pub async fn handle_event(&self, event: ChatEvent) {
        match event {
            ChatEvent::Command {
                chat_id,
                sender_name,
                text,
            } => self.handle_command(chat_id, &sender_name, &text).await,
            ChatEvent::Choice {
                chat_id,
                sender_name,
                choice_id,
                data,
            } => {
                self.handle_choice(chat_id, &sender_name, &choice_id, &data)
                    .await
            }
        }
    }

    async fn handle_command(&self, chat_id: i64, sender_name: &str, text: &str) {
        let mut words = text.split_whitespace();
        // In group chats commands arrive as /cmd@botname.
        let command = words
            .next()
            .map(|w| w.split('@').next().unwrap_or(w))
            .unwrap_or_default();

        let reply = match command {
            "/pair" => self.pair(chat_id, sender_name, words.next()),
            "/unpair" => match self.store.unpair_approver(chat_id) {
                Ok(true) => "Unpaired. This chat can no longer approve requests.".to_string(),
                Ok(false) => "This chat is not paired.".to_string(),
                Err(e) => store_failure("unpair", e),
            },
            "/status" => match self.store.is_paired(chat_id) {
                Ok(true) => format!("Paired as {sender_name}. Approval requests will arrive here."),
                Ok(false) => "Not paired. Send /pair <secret> to pair.".to_string(),
                Err(e) => store_failure("status", e),
            },
            other => {
                tracing::debug!(command = other, "ignoring unknown chat command");
                return;
            }
        };

        if let Err(e) = self.transport.send_text(chat_id, &reply).await {
            tracing::warn!(chat_id, error = %e, "failed to send command reply");
        }
    }

    fn pair(&self, chat_id: i64, sender_name: &str, secret: Option<&str>) -> String {
        if !self.pairing.enabled {
            return "Pairing is disabled for this gateway.".to_string();
        }
        let Some(expected) = self.pairing.secret.as_deref() else {
            return "Pairing is enabled but no pairing secret is configured.".to_string();
        };
        let Some(presented) = secret else {
            return "Usage: /pair <secret>".to_string();
        };
        if presented != expected {
            tracing::warn!(chat_id, "pairing attempt with wrong secret");
            return "Invalid pairing secret.".to_string();
        }
        match self.store.pair_approver(chat_id, sender_name) {
            Ok(()) => {
                tracing::info!(chat_id, approver = sender_name, "approver paired");
                "Paired. You can now approve or deny requests from this chat.".to_string()
            }
            Err(e) => store_failure("pair", e),
        }
    }

    async fn handle_choice(&self, chat_id: i64, sender_name: &str, choice_id: &str, data: &str) {
        if self.pairing.enabled {
            match self.store.is_paired(chat_id) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(chat_id, "decision refused: chat is not paired");
                    self.ack(choice_id, "You are not paired with this gateway.")
                        .await;
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "pairing lookup failed; refusing decision");
                    self.ack(choice_id, "Decision could not be verified.").await;
                    return;
                }
            }
        }

        let Some((action, id)) = parse_callback(data) else {
            tracing::warn!(data, "malformed callback payload");
            self.ack(choice_id, "Malformed action.").await;
            return;
        };

        let decision = match action {
            CallbackAction::Approve(ttl) => Decision::approve(ttl, sender_name),
            CallbackAction::Deny => Decision::deny(sender_name),
        };

        if !self.pending.fulfill(id, decision.clone()) {
            self.ack(choice_id, "This approval request has expired.").await;
            return;
        }

        self.ack(choice_id, "Decision recorded.").await;
        let outcome = match (decision.approved, decision.ttl) {
            (true, Some(ttl)) => format!("✅ Approved for {} by {sender_name}", ttl.label()),
            _ => format!("🚫 Denied by {sender_name}"),
        };
        self.conclude_prompt(id, &outcome).await;
    }

    /// Mark a prompt as expired after the pipeline deadline passed.
    pub async fn note_timeout(&self, id: Uuid) {
        self.conclude_prompt(id, "⏱ Timed out (denied)").await;
    }

    /// Rewrite the original prompt with its final outcome.
    async fn conclude_prompt(&self, id: Uuid, outcome: &str) {
        let Some(state) = self.prompts.lock().remove(&id) else {
            return;
        };
        let text = format!("{}\n\n{outcome}", state.text);
        for message in &state.messages {
            if let Err(e) = self.transport.edit_prompt(message, &text).await {
                tracing::warn!(
                    chat_id = message.chat_id,
                    error = %e,
                    "failed to edit concluded prompt"
                );
            }
        }
    }

    async fn ack(&self, choice_id: &str, text: &str) {
        if let Err(e) = self.transport.ack_choice(choice_id, text).await {
            tracing::warn!(error = %e, "failed to acknowledge choice");
        }
    }
}

fn store_failure(op: &str, e: AuditStoreError) -> String {
    tracing::error!(error = %e, "audit store failure during /{op}");
    "Gateway storage error; try again later.".to_string()
}

enum CallbackAction {
    Approve(TtlTag),
    Deny,
}

fn parse_callback(data: &str) -> Option<(CallbackAction, Uuid)> {
    let (action, raw_id) = data.split_once(':')?;
    let id = Uuid::parse_str(raw_id).ok()?;
    if action == DENY_ACTION {
        return Some((CallbackAction::Deny, id));
    }
    TtlTag::from_callback_action(action).map(|tag| (CallbackAction::Approve(tag), id))
}

/// Render the approval prompt for one pending request.
fn render_prompt(request: &PendingApproval) -> String {
    let local = request
        .requested_at
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S");
    format!(
        "🔐 Approval required\n\
         Service: {}\n\
         Method: {}\n\
         Path: {}\n\
         Agent: {}\n\
         Time: {}\n\
         Request: {}",
        request.service, request.method, request.path, request.agent_ip, local, request.id
    )
}

/// The six choice buttons for one request id.
fn prompt_actions(id: Uuid) -> Vec<PromptAction> {
    let mut actions: Vec<PromptAction> = TtlTag::ALL
        .into_iter()
        .map(|tag| PromptAction {
            label: tag.label().to_string(),
            data: format!("{}:{id}", tag.callback_action()),
        })
        .collect();
    actions.push(PromptAction {
        label: "Deny".to_string(),
        data: format!("{DENY_ACTION}:{id}"),
    });
    actions
}
