//! In-flight approval requests and their one-shot reply channels.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::grant::TtlTag;

/// One request suspended for a human decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingApproval {
    pub id: Uuid,
    pub service: String,
    pub method: String,
    pub path: String,
    pub agent_ip: String,
    pub requested_at: DateTime<Utc>,
}

impl PendingApproval {
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        agent_ip: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            service: service.into(),
            method: method.into(),
            path: path.into(),
            agent_ip: agent_ip.into(),
            requested_at: Utc::now(),
        }
    }
}

/// An approver's answer to one pending approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub approved: bool,

    /// Grant lifetime; present iff approved.
    pub ttl: Option<TtlTag>,

    /// Approver display name, or a sentinel when no human decided.
    pub approver: String,
}

impl Decision {
    pub fn approve(ttl: TtlTag, approver: impl Into<String>) -> Self {
        Self {
            approved: true,
            ttl: Some(ttl),
            approver: approver.into(),
        }
    }

    pub fn deny(approver: impl Into<String>) -> Self {
        Self {
            approved: false,
            ttl: None,
            approver: approver.into(),
        }
    }
}

/// Registry of reply channels keyed by request id.
///
/// Request tasks register and await; the notifier's reply handler
/// fulfills. Removing the sender from the map before sending makes
/// fulfillment exactly-once: a second decision for the same id finds
/// nothing and is reported as expired.
#[derive(Default)]
pub struct PendingRegistry {
    slots: Mutex<HashMap<Uuid, oneshot::Sender<Decision>>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending id and get the receiving half.
    pub fn register(&self, id: Uuid) -> oneshot::Receiver<Decision> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(id, tx);
        rx
    }

    /// Deliver a decision. Returns false when the id is unknown
    /// (already resolved or timed out) or the waiter is gone.
    pub fn fulfill(&self, id: Uuid, decision: Decision) -> bool {
        let sender = self.slots.lock().remove(&id);
        match sender {
            Some(tx) => tx.send(decision).is_ok(),
            None => false,
        }
    }

    /// Drop a pending id without deciding it (deadline expiry).
    pub fn remove(&self, id: Uuid) -> bool {
        self.slots.lock().remove(&id).is_some()
    }

    /// Number of requests currently waiting.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fulfill_delivers_to_waiter() {
        let registry = PendingRegistry::new();
        let id = Uuid::new_v4();
        let rx = registry.register(id);

        assert!(registry.fulfill(id, Decision::approve(TtlTag::Hours1, "alice")));

        let decision = rx.await.unwrap();
        assert!(decision.approved);
        assert_eq!(decision.ttl, Some(TtlTag::Hours1));
        assert_eq!(decision.approver, "alice");
    }

    #[tokio::test]
    async fn test_fulfill_is_exactly_once() {
        let registry = PendingRegistry::new();
        let id = Uuid::new_v4();
        let _rx = registry.register(id);

        assert!(registry.fulfill(id, Decision::deny("alice")));
        // The second decision finds no slot.
        assert!(!registry.fulfill(id, Decision::approve(TtlTag::Hours1, "bob")));
    }

    #[test]
    fn test_fulfill_unknown_id_is_rejected() {
        let registry = PendingRegistry::new();
        assert!(!registry.fulfill(Uuid::new_v4(), Decision::deny("alice")));
    }

    #[test]
    fn test_remove_clears_slot() {
        let registry = PendingRegistry::new();
        let id = Uuid::new_v4();
        let _rx = registry.register(id);

        assert_eq!(registry.len(), 1);
        assert!(registry.remove(id));
        assert!(registry.is_empty());
        assert!(!registry.remove(id));
    }

    #[tokio::test]
    async fn test_fulfill_after_waiter_dropped_reports_failure() {
        let registry = PendingRegistry::new();
        let id = Uuid::new_v4();
        drop(registry.register(id));

        assert!(!registry.fulfill(id, Decision::deny("alice")));
    }
}
