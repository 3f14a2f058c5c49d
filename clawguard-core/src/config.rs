//! Gateway configuration types.
//!
//! These structs are the deserialization target of the bootstrap layer
//! (YAML with environment interpolation, owned by the binary crate) and
//! the in-process source of truth for everything tunable. Validation
//! runs once at load; invariant: every service in a validated config
//! passes the security guard.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guard::{self, GuardError};
use crate::services::ServiceDefinition;

/// Default inbound body cap: 10 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default captured-payload cap in bytes.
pub const DEFAULT_MAX_PAYLOAD_LOG_SIZE: usize = 2048;

/// Default approval pipeline deadline in seconds.
pub const DEFAULT_PIPELINE_TIMEOUT_SECS: u64 = 120;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Bind address for the proxy listener.
    #[serde(default)]
    pub listen: ListenConfig,

    /// Shared agent secret; every non-admin request must present it.
    #[serde(default)]
    pub agent_key: String,

    /// Bootstrap service table.
    #[serde(default)]
    pub services: Vec<ServiceDefinition>,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub approvals: ApprovalConfig,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl GatewayConfig {
    /// Validate the whole config.
    ///
    /// Checks the agent key, service-name uniqueness, and runs the
    /// security guard over every bootstrap service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_key.trim().is_empty() {
            return Err(ConfigError::MissingAgentKey);
        }
        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::UnnamedService);
            }
            if service.name.starts_with("__") {
                return Err(ConfigError::ReservedServiceName(service.name.clone()));
            }
            if !seen.insert(service.name.clone()) {
                return Err(ConfigError::DuplicateService(service.name.clone()));
            }
            guard::validate_service(service, &self.security).map_err(|source| {
                ConfigError::InvalidService {
                    service: service.name.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }
}

/// Listener bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8300,
        }
    }
}

/// Security guard knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Upstream hostnames permitted by the guard. Empty allows all.
    pub allowed_upstream_hosts: Vec<String>,

    /// Block upstream host literals in private/reserved ranges.
    pub block_private_ips: bool,

    /// Run the advisory DNS resolution check at config load.
    pub dns_check: bool,

    /// Exact IPv4 addresses or CIDR blocks admitted to the admin surface.
    pub admin_ip_allowlist: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_upstream_hosts: Vec::new(),
            block_private_ips: true,
            dns_check: false,
            admin_ip_allowlist: Vec::new(),
        }
    }
}

/// Approval coordination knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// How long a request waits for a human decision before it is
    /// resolved as denied. Independent of any grant TTL.
    pub pipeline_timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            pipeline_timeout_secs: DEFAULT_PIPELINE_TIMEOUT_SECS,
        }
    }
}

/// Out-of-band channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token. Empty disables the notifier; every approval
    /// prompt then fails closed.
    pub bot_token: String,

    /// Fixed chat to prompt in addition to paired approvers.
    pub chat_id: Option<i64>,

    pub pairing: PairingConfig,

    /// Long-poll window for update fetching.
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: None,
            pairing: PairingConfig::default(),
            poll_timeout_secs: 30,
        }
    }
}

/// Approver pairing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// When enabled, only pre-paired chat identities may decide.
    pub enabled: bool,

    /// Secret an approver must present to `/pair`.
    pub secret: Option<String>,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret: None,
        }
    }
}

/// Audit store and payload capture knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// SQLite database path.
    pub db_path: PathBuf,

    /// Capture request/response bodies into the audit store.
    pub capture_payloads: bool,

    /// Captured-payload cap in bytes; excess is truncated with a marker.
    pub max_payload_log_size: usize,

    /// Inbound body ceiling enforced at the HTTP framing layer.
    pub max_body_bytes: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("clawguard.db"),
            capture_payloads: false,
            max_payload_log_size: DEFAULT_MAX_PAYLOAD_LOG_SIZE,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Configuration rejection reasons.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("agent_key must be set")]
    MissingAgentKey,

    #[error("every service needs a non-empty name")]
    UnnamedService,

    #[error("service name '{0}' collides with the reserved '__' prefix")]
    ReservedServiceName(String),

    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("service '{service}' rejected by the security guard: {source}")]
    InvalidService {
        service: String,
        source: GuardError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ServicePolicy;
    use crate::services::CredentialRecipe;
    use url::Url;

    fn service(name: &str, upstream: &str) -> ServiceDefinition {
        ServiceDefinition {
            name: name.to_string(),
            upstream: Url::parse(upstream).unwrap(),
            intercept_hosts: Vec::new(),
            credentials: CredentialRecipe::Bearer {
                token: "T".to_string(),
            },
            policy: ServicePolicy::default(),
        }
    }

    fn base_config() -> GatewayConfig {
        GatewayConfig {
            agent_key: "K".to_string(),
            services: vec![service("gh", "https://api.github.com")],
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_missing_agent_key_rejected() {
        let mut config = base_config();
        config.agent_key = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingAgentKey)
        ));
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let mut config = base_config();
        config.services.push(service("gh", "https://api.github.com"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateService(name)) if name == "gh"
        ));
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        let mut config = base_config();
        config.services.push(service("__status", "https://x.example"));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ReservedServiceName(_))
        ));
    }

    #[test]
    fn test_service_outside_allowlist_rejected() {
        let mut config = base_config();
        config.security.allowed_upstream_hosts = vec!["example.com".to_string()];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidService { service, .. } if service == "gh"));
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen.port, 8300);
        assert_eq!(config.approvals.pipeline_timeout_secs, 120);
        assert_eq!(config.audit.max_body_bytes, 10 * 1024 * 1024);
        assert!(config.security.block_private_ips);
        assert!(config.telegram.pairing.enabled);
        assert!(!config.audit.capture_payloads);
    }
}
