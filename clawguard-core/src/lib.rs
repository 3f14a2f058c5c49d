//! # ClawGuard Core
//!
//! The core of the clawguard security gateway: an untrusted automated
//! agent makes its outbound API calls through the gateway, which holds
//! the real upstream credentials and gates every call behind policy and,
//! where policy demands it, a human decision delivered out-of-band.
//!
//! This crate carries everything except the HTTP surfaces:
//!
//! - **[`services`]**: service definitions, credential recipes, and the
//!   runtime-mutable live service table with its override layer
//! - **[`policy`]**: ordered first-match-wins request rules
//! - **[`guard`]**: pure security validation (allowlist, private-IP
//!   block, runtime host-pin, redirect re-check, admin IP allowlist)
//! - **[`approval`]**: the grant state machine, pending-approval
//!   registry, and the coordinator that suspends requests on a human
//!   decision
//! - **[`notify`]**: prompt rendering, approver pairing, and reply
//!   routing over a pluggable chat transport
//! - **[`audit`]**: the durable SQLite store for requests, grants,
//!   paired approvers, and service overrides
//!
//! The axum proxy engine lives in `clawguard-server`; the Telegram
//! transport in `clawguard-telegram`.
//!
//! ## Approval flow
//!
//! ```text
//! request --> policy --> auto_approve -------------------> forward
//!                 \--> require_approval --> live grant? --> forward
//!                                               \--> prompt human
//!                                                     approve(ttl) -> grant installed -> forward
//!                                                     deny/timeout -> 403
//! ```

pub mod approval;
pub mod audit;
pub mod config;
pub mod error;
pub mod guard;
pub mod notify;
pub mod policy;
pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use approval::{ApprovalCoordinator, Decision, Grant, PendingApproval, PendingRegistry, TtlTag};
pub use audit::{AuditRecord, AuditStore, AuditStoreError, RequestOutcome};
pub use config::{GatewayConfig, SecurityConfig};
pub use error::{GatewayError, Result};
pub use notify::{ChatEvent, ChatTransport, Notifier, NotifyError};
pub use policy::{Action, PolicyRule, ServicePolicy};
pub use services::{CredentialRecipe, ServiceDefinition, ServiceTable};
