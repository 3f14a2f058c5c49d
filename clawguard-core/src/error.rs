//! Top-level error types for clawguard
//!
//! This module provides a flattened, pipeline-facing error type that maps
//! directly onto the gateway's user-visible error taxonomy.

use thiserror::Error;

use crate::audit::AuditStoreError;
use crate::guard::GuardError;
use crate::notify::NotifyError;

/// Top-level error type for gateway operations
///
/// Each variant corresponds to one terminal outcome of the request
/// pipeline:
///
/// - [`GatewayError::Identity`] - missing or wrong agent key (401)
/// - [`GatewayError::UnknownService`] / [`GatewayError::UnknownHost`] - no route (404)
/// - [`GatewayError::Blocked`] - security guard rejection (403)
/// - [`GatewayError::Denied`] - human denial or approval deadline (403)
/// - [`GatewayError::RedirectBlocked`] - blocked upstream redirect (403)
/// - [`GatewayError::Upstream`] - upstream transport failure (502)
/// - [`GatewayError::Internal`] - anything else (500)
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Agent secret header missing or wrong
    #[error("invalid or missing agent key: {0}")]
    Identity(String),

    /// First path segment names no configured service
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// Host header matches no configured intercept hostname
    #[error("unknown host: {0}")]
    UnknownHost(String),

    /// Security guard rejected the constructed upstream URL
    #[error("request blocked by security policy: {0}")]
    Blocked(#[from] GuardError),

    /// Approval denied by a human or expired at the pipeline deadline
    #[error("approval denied or timed out: {0}")]
    Denied(String),

    /// Upstream answered with a redirect that failed re-validation
    #[error("redirect blocked by security policy: {0}")]
    RedirectBlocked(GuardError),

    /// Upstream connect/transport failure
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Audit store failure
    #[error("audit store error: {0}")]
    Store(#[from] AuditStoreError),

    /// Out-of-band notification failure
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),

    /// Uncategorized internal failure
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns true if this error means the request never authenticated
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity(_))
    }

    /// Returns true if this error is a routing miss (unknown service or host)
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::UnknownService(_) | Self::UnknownHost(_))
    }

    /// Returns true if this error is a security-policy rejection
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::Blocked(_) | Self::RedirectBlocked(_))
    }

    /// Returns true if a human (or the deadline) denied the request
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    /// Returns true if the upstream transport failed
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(GatewayError::Identity("bad key".into()).is_identity());
        assert!(GatewayError::UnknownService("gh".into()).is_resolution());
        assert!(GatewayError::UnknownHost("x.example".into()).is_resolution());
        assert!(GatewayError::Denied("timeout".into()).is_denial());
        assert!(GatewayError::Upstream("connection reset".into()).is_upstream());
    }

    #[test]
    fn test_guard_errors_are_policy_violations() {
        let err: GatewayError = GuardError::HostNotAllowed("evil.example".into()).into();
        assert!(err.is_policy_violation());

        let err = GatewayError::RedirectBlocked(GuardError::HostNotAllowed("evil.example".into()));
        assert!(err.is_policy_violation());
    }
}
