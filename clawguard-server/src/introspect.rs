//! Agent-facing introspection endpoints.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::GatewayHttpError;
use crate::proxy::verify_agent_key;
use crate::state::AppState;

const DEFAULT_AUDIT_LIMIT: usize = 50;
const MAX_AUDIT_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<usize>,
}

/// `GET /__status`: configured services plus the live grant view.
pub async fn status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayHttpError> {
    verify_agent_key(&state, &headers)?;

    let now = Utc::now();
    let approvals: serde_json::Map<String, Value> = state
        .coordinator
        .grants_view()
        .into_iter()
        .map(|grant| {
            (
                grant.service.clone(),
                json!({
                    "expiresAt": grant.expires_at.to_rfc3339(),
                    "approvedBy": grant.approved_by,
                    "remainingMinutes": grant.remaining_minutes(now),
                }),
            )
        })
        .collect();

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "services": state.table.names(),
        "approvals": approvals,
    })))
}

/// `GET /__audit`: the most recent audit records, newest first.
pub async fn audit_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Value>, GatewayHttpError> {
    verify_agent_key(&state, &headers)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .min(MAX_AUDIT_LIMIT);
    let records = state
        .audit
        .recent_requests(limit)
        .map_err(|e| GatewayHttpError::Internal(e.to_string()))?;
    Ok(Json(json!(records)))
}
