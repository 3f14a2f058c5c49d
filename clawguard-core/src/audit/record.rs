//! Audit store row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The terminal outcome of one request, ready to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub service: String,
    pub method: String,
    pub path: String,
    pub approved: bool,
    pub response_status: Option<u16>,
    pub agent_ip: String,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
}

/// One appended request row, as read back for introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub method: String,
    pub path: String,
    pub approved: bool,
    pub response_status: Option<u16>,
    pub agent_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
}

/// One persisted approval grant row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub approved_by: String,
    pub ttl_seconds: i64,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

/// A chat identity authorized to decide approvals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedApprover {
    pub chat_id: i64,
    pub name: String,
    pub paired_at: DateTime<Utc>,
}

/// One persisted service override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRow {
    pub service_name: String,
    pub config_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Dashboard aggregations over the requests table since a cutoff.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Request counts keyed by service, busiest first.
    pub by_service: Vec<(String, i64)>,

    /// Request counts keyed by hour of day (0-23), present hours only.
    pub by_hour: Vec<(u8, i64)>,

    /// Request counts keyed by HTTP method, busiest first.
    pub by_method: Vec<(String, i64)>,

    pub approved: i64,
    pub denied: i64,
    pub total: i64,
}
