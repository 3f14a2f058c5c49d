//! Service definitions and the live service table.
//!
//! A service is a named routing target: an upstream base URL, an
//! optional list of intercept hostnames, a credential-injection recipe,
//! and a request policy. The live table starts from bootstrap config
//! and can be mutated at runtime through the override layer, which
//! re-runs the security guard before installing anything.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::audit::{AuditStore, AuditStoreError};
use crate::config::SecurityConfig;
use crate::error::GatewayError;
use crate::guard;
use crate::policy::ServicePolicy;

/// Placeholder for credential tokens on the masked read side.
const MASKED_TOKEN: &str = "***";

/// How the gateway attaches the real upstream credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialRecipe {
    /// `Authorization: Bearer <token>`.
    Bearer { token: String },

    /// A custom named header set to the token.
    Header { name: String, token: String },

    /// A named query parameter appended to the upstream URL. An
    /// existing same-name parameter is replaced.
    Query { name: String, token: String },
}

impl CredentialRecipe {
    /// Copy of this recipe with the token replaced by `***`.
    pub fn masked(&self) -> Self {
        match self {
            Self::Bearer { .. } => Self::Bearer {
                token: MASKED_TOKEN.to_string(),
            },
            Self::Header { name, .. } => Self::Header {
                name: name.clone(),
                token: MASKED_TOKEN.to_string(),
            },
            Self::Query { name, .. } => Self::Query {
                name: name.clone(),
                token: MASKED_TOKEN.to_string(),
            },
        }
    }
}

/// One configured upstream service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Unique routing name; the first path segment in path-prefix mode.
    pub name: String,

    /// Upstream base URL; its path is preserved when the remainder is
    /// resolved against it.
    pub upstream: Url,

    /// Hostnames routed to this service in host-header mode.
    #[serde(default)]
    pub intercept_hosts: Vec<String>,

    pub credentials: CredentialRecipe,

    #[serde(default)]
    pub policy: ServicePolicy,
}

impl ServiceDefinition {
    /// Host of the upstream base URL.
    pub fn upstream_host(&self) -> &str {
        self.upstream.host_str().unwrap_or_default()
    }

    /// Copy with the credential token masked, for read-side surfaces.
    pub fn masked(&self) -> Self {
        Self {
            credentials: self.credentials.masked(),
            ..self.clone()
        }
    }
}

/// The live, runtime-mutable service table.
///
/// Readers resolve per request; writers are the override layer only.
/// Entries are `Arc`-shared so a reader never observes a torn
/// definition: it either gets the old Arc or the new one.
pub struct ServiceTable {
    bootstrap: HashMap<String, Arc<ServiceDefinition>>,
    live: RwLock<HashMap<String, Arc<ServiceDefinition>>>,
}

impl ServiceTable {
    /// Build the table from validated bootstrap services.
    pub fn new(services: Vec<ServiceDefinition>) -> Self {
        let bootstrap: HashMap<String, Arc<ServiceDefinition>> = services
            .into_iter()
            .map(|s| (s.name.clone(), Arc::new(s)))
            .collect();
        let live = RwLock::new(bootstrap.clone());
        Self { bootstrap, live }
    }

    /// Look up a service by routing name.
    pub fn get(&self, name: &str) -> Option<Arc<ServiceDefinition>> {
        self.live.read().get(name).cloned()
    }

    /// Find the first service whose intercept list contains `host`
    /// (port stripped before comparison).
    pub fn match_intercept_host(&self, host: &str) -> Option<Arc<ServiceDefinition>> {
        let host = host.split(':').next().unwrap_or(host);
        let live = self.live.read();
        let mut names: Vec<&String> = live.keys().collect();
        names.sort();
        for name in names {
            let def = &live[name];
            if def.intercept_hosts.iter().any(|h| h == host) {
                return Some(Arc::clone(def));
            }
        }
        None
    }

    /// Sorted names of every live service.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.live.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of live services.
    pub fn len(&self) -> usize {
        self.live.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.read().is_empty()
    }

    /// Install or replace a live definition. Callers must have run the
    /// guard first.
    pub fn install(&self, def: ServiceDefinition) {
        self.live.write().insert(def.name.clone(), Arc::new(def));
    }

    /// Drop an override: revert to the bootstrap definition when one
    /// exists, otherwise remove the service entirely. Returns whether
    /// the table changed.
    pub fn remove_override(&self, name: &str) -> bool {
        let mut live = self.live.write();
        match self.bootstrap.get(name) {
            Some(original) => {
                live.insert(name.to_string(), Arc::clone(original));
                true
            }
            None => live.remove(name).is_some(),
        }
    }
}

/// Load persisted overrides into the table at startup.
///
/// Overrides that no longer pass the security guard are skipped with a
/// warning rather than aborting startup. Returns the number applied.
pub fn load_overrides(
    table: &ServiceTable,
    store: &AuditStore,
    security: &SecurityConfig,
) -> Result<usize, AuditStoreError> {
    let mut applied = 0;
    for row in store.list_overrides()? {
        let def: ServiceDefinition = match serde_json::from_str(&row.config_json) {
            Ok(def) => def,
            Err(e) => {
                tracing::warn!(service = %row.service_name, error = %e, "skipping unparseable service override");
                continue;
            }
        };
        if let Err(e) = guard::validate_service(&def, security) {
            tracing::warn!(service = %def.name, error = %e, "skipping service override rejected by security guard");
            continue;
        }
        table.install(def);
        applied += 1;
    }
    Ok(applied)
}

/// Apply an override from the admin plane: guard first, then persist,
/// then install in the live table.
pub fn apply_override(
    table: &ServiceTable,
    store: &AuditStore,
    security: &SecurityConfig,
    def: ServiceDefinition,
) -> Result<(), GatewayError> {
    guard::validate_service(&def, security)?;
    let json = serde_json::to_string(&def)
        .map_err(|e| GatewayError::Internal(format!("serialize override: {e}")))?;
    store.upsert_override(&def.name, &json)?;
    table.install(def);
    Ok(())
}

/// Delete a persisted override and revert the live table.
pub fn delete_override(
    table: &ServiceTable,
    store: &AuditStore,
    name: &str,
) -> Result<bool, AuditStoreError> {
    let removed = store.delete_override(name)?;
    if removed {
        table.remove_override(name);
    }
    Ok(removed)
}
