//! The approval coordinator.
//!
//! Owns the grant state machine and the one-human-decision round trip.
//! Grants live in two places: the durable approvals table and a fast
//! in-memory map rebuilt on startup. Writes go persist-first so a crash
//! between the two leaves a grant that hydration picks up; revocation
//! is persistence-first for the same reason.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use super::grant::{Grant, TtlTag};
use super::pending::{PendingApproval, PendingRegistry};
use crate::audit::{AuditStore, AuditStoreError};
use crate::notify::{
    Notifier, NotifyError, APPROVER_SEND_FAILURE, APPROVER_TIMEOUT, APPROVER_UNPAIRED,
};
use crate::policy::Action;
use crate::services::ServiceDefinition;

/// Coordinates approvals across concurrent request tasks.
pub struct ApprovalCoordinator {
    grants: RwLock<HashMap<String, Grant>>,
    pending: Arc<PendingRegistry>,
    notifier: Arc<Notifier>,
    store: Arc<AuditStore>,
    deadline: Duration,
}

impl ApprovalCoordinator {
    /// Build a coordinator.
    ///
    /// `deadline` is the per-request approval wait, independent of any
    /// grant TTL.
    pub fn new(
        notifier: Arc<Notifier>,
        store: Arc<AuditStore>,
        pending: Arc<PendingRegistry>,
        deadline: Duration,
    ) -> Self {
        Self {
            grants: RwLock::new(HashMap::new()),
            pending,
            notifier,
            store,
            deadline,
        }
    }

    /// Rebuild the live grants map from the durable table.
    ///
    /// Expired rows are garbage-collected first; of the remaining
    /// non-revoked rows the newest per service wins. Returns the number
    /// of live grants.
    pub fn hydrate(&self) -> Result<usize, AuditStoreError> {
        let expired = self.store.delete_expired_approvals()?;
        if expired > 0 {
            tracing::debug!(expired, "garbage-collected expired approval rows");
        }

        let rows = self.store.active_approvals()?;
        let mut grants = self.grants.write();
        grants.clear();
        for row in rows {
            // Rows arrive newest-first; the first per service wins.
            grants.entry(row.service.clone()).or_insert(Grant {
                service: row.service,
                approved_by: row.approved_by,
                granted_at: row.timestamp,
                expires_at: row.expires_at,
                revoked: false,
            });
        }
        Ok(grants.len())
    }

    /// Decide whether a request may be forwarded.
    ///
    /// Auto-approved requests pass without a prompt. Otherwise a live
    /// grant passes immediately, and failing that the request suspends
    /// on a fresh pending approval until a human decides or the
    /// deadline expires. Denials and timeouts return false.
    pub async fn check(
        &self,
        service: &ServiceDefinition,
        method: &str,
        path: &str,
        agent_ip: &str,
    ) -> bool {
        if service.policy.resolve(method, path) == Action::AutoApprove {
            return true;
        }
        self.check_requires_approval(&service.name, method, path, agent_ip)
            .await
    }

    async fn check_requires_approval(
        &self,
        service: &str,
        method: &str,
        path: &str,
        agent_ip: &str,
    ) -> bool {
        if self.live_grant(service).is_some() {
            return true;
        }

        let request = PendingApproval::new(service, method, path, agent_ip);
        let rx = self.pending.register(request.id);
        tracing::info!(
            service,
            method,
            path,
            request_id = %request.id,
            "awaiting human approval"
        );

        if let Err(e) = self.notifier.dispatch_prompt(&request).await {
            self.pending.remove(request.id);
            let approver = match e {
                NotifyError::NoPairedApprover => APPROVER_UNPAIRED,
                _ => APPROVER_SEND_FAILURE,
            };
            tracing::warn!(
                service,
                request_id = %request.id,
                approved_by = approver,
                error = %e,
                "approval prompt undeliverable; denying"
            );
            return false;
        }

        match tokio::time::timeout(self.deadline, rx).await {
            Ok(Ok(decision)) => match (decision.approved, decision.ttl) {
                (true, Some(ttl)) => {
                    self.install_grant(service, &decision.approver, ttl);
                    true
                }
                _ => {
                    tracing::info!(
                        service,
                        request_id = %request.id,
                        approved_by = %decision.approver,
                        "request denied"
                    );
                    false
                }
            },
            Ok(Err(_)) => {
                // Reply channel dropped without a decision.
                self.pending.remove(request.id);
                false
            }
            Err(_) => {
                self.pending.remove(request.id);
                self.notifier.note_timeout(request.id).await;
                tracing::warn!(
                    service,
                    request_id = %request.id,
                    approved_by = APPROVER_TIMEOUT,
                    "approval deadline expired"
                );
                false
            }
        }
    }

    /// Persist a fresh grant, then install it, superseding any older
    /// grant for the service.
    fn install_grant(&self, service: &str, approver: &str, ttl: TtlTag) {
        let grant = Grant::new(service, approver, ttl);
        if let Err(e) =
            self.store
                .insert_approval(service, approver, ttl.seconds(), grant.expires_at)
        {
            tracing::error!(service, error = %e, "failed to persist approval grant");
        }
        tracing::info!(
            service,
            approved_by = approver,
            ttl = ttl.label(),
            expires_at = %grant.expires_at,
            "grant installed"
        );
        self.grants.write().insert(service.to_string(), grant);
    }

    /// The live grant for a service, if any. A stale entry found here
    /// is removed in place.
    pub fn live_grant(&self, service: &str) -> Option<Grant> {
        {
            let grants = self.grants.read();
            match grants.get(service) {
                Some(g) if g.is_live(Utc::now()) => return Some(g.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        let mut grants = self.grants.write();
        if let Some(g) = grants.get(service) {
            if g.is_live(Utc::now()) {
                return Some(g.clone());
            }
            grants.remove(service);
        }
        None
    }

    /// Snapshot of every live grant, sorted by service.
    pub fn grants_view(&self) -> Vec<Grant> {
        let now = Utc::now();
        let mut live: Vec<Grant> = self
            .grants
            .read()
            .values()
            .filter(|g| g.is_live(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| a.service.cmp(&b.service));
        live
    }

    /// Revoke the live grant for one service. Returns whether one
    /// existed.
    pub fn revoke(&self, service: &str) -> Result<bool, AuditStoreError> {
        if self.live_grant(service).is_none() {
            return Ok(false);
        }
        self.store.revoke_approvals(service)?;
        self.grants.write().remove(service);
        tracing::info!(service, "grant revoked");
        Ok(true)
    }

    /// Revoke every live grant. Returns the count.
    pub fn revoke_all(&self) -> Result<usize, AuditStoreError> {
        let services: Vec<String> = self
            .grants_view()
            .into_iter()
            .map(|g| g.service)
            .collect();
        let mut revoked = 0;
        for service in services {
            if self.revoke(&service)? {
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
