//! Durable audit persistence.
//!
//! Every terminal request outcome, approval grant, paired approver, and
//! service override lands here. The store is SQLite in WAL mode; see
//! [`AuditStore`] for the write/read surface and `schema.sql` for the
//! base layout.

mod record;
mod store;

pub use record::{
    ApprovalRow, AuditRecord, DashboardStats, OverrideRow, PairedApprover, RequestOutcome,
};
pub use store::{AuditStore, AuditStoreError};
