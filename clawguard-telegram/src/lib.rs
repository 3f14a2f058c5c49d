//! # ClawGuard Telegram
//!
//! Telegram Bot API transport for the clawguard security gateway.
//! Approval prompts become messages with an inline keyboard of TTL
//! buttons; approver taps flow back through a `getUpdates` long-poll
//! loop into the core notifier, which verifies pairing and resolves
//! the waiting request.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clawguard_telegram::{TelegramClient, TelegramTransport};
//!
//! let client = Arc::new(TelegramClient::new("123456:bot-token"));
//! let transport = TelegramTransport::new(client);
//! // Hand `transport` to clawguard_core::notify::Notifier.
//! ```

mod client;
mod error;
mod transport;
pub mod types;

pub use client::TelegramClient;
pub use error::TelegramError;
pub use transport::{run_update_loop, TelegramTransport};
