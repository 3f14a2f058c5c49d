//! Shared application state for the proxy engine.

use std::sync::Arc;

use clawguard_core::approval::ApprovalCoordinator;
use clawguard_core::audit::AuditStore;
use clawguard_core::config::{GatewayConfig, SecurityConfig};
use clawguard_core::services::ServiceTable;

/// Canonical agent secret header.
pub const AGENT_KEY_HEADER: &str = "x-clawguard-key";

/// Legacy alias, accepted on input and stripped before forwarding.
pub const LEGACY_AGENT_KEY_HEADER: &str = "x-agentgate-key";

/// Gateway-internal header prefixes, stripped before forwarding.
pub const STRIPPED_HEADER_PREFIXES: [&str; 2] = ["x-clawguard-", "x-agentgate-"];

/// The per-request knobs the pipeline needs.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub agent_key: String,
    pub capture_payloads: bool,
    pub max_payload_log_size: usize,
    pub max_body_bytes: usize,
    pub security: SecurityConfig,
}

impl GatewaySettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            agent_key: config.agent_key.clone(),
            capture_payloads: config.audit.capture_payloads,
            max_payload_log_size: config.audit.max_payload_log_size,
            max_body_bytes: config.audit.max_body_bytes,
            security: config.security.clone(),
        }
    }
}

/// Shared state cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<ServiceTable>,
    pub coordinator: Arc<ApprovalCoordinator>,
    pub audit: Arc<AuditStore>,
    pub settings: Arc<GatewaySettings>,

    /// Upstream HTTP client. Redirects are never followed; a 3xx is
    /// re-validated and passed through instead.
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(
        table: Arc<ServiceTable>,
        coordinator: Arc<ApprovalCoordinator>,
        audit: Arc<AuditStore>,
        settings: GatewaySettings,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            table,
            coordinator,
            audit,
            settings: Arc::new(settings),
            client,
        })
    }
}
