//! Out-of-band approval notification.
//!
//! Converts a pending approval into a rendered chat prompt with six
//! choice buttons, enforces approver pairing, and routes the reply back
//! to the waiting request task. The concrete chat wire lives behind
//! [`ChatTransport`].

mod notifier;
mod transport;

pub use notifier::{Notifier, NotifyError};
pub use transport::{ChatEvent, ChatTransport, MessageRef, PromptAction, TransportError};

/// Approver-identity sentinel recorded when the pipeline deadline
/// expired before any human decided.
pub const APPROVER_TIMEOUT: &str = "timeout";

/// Approver-identity sentinel recorded when the prompt could not be
/// delivered to the chat service.
pub const APPROVER_SEND_FAILURE: &str = "telegram_error";

/// Approver-identity sentinel recorded when pairing left nobody to
/// prompt.
pub const APPROVER_UNPAIRED: &str = "unpaired";
