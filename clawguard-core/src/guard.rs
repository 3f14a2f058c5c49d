//! Security guard: pure validation functions.
//!
//! These checks run at config load (every configured or overridden
//! service must pass) and per request (the constructed upstream URL and
//! any upstream redirect target). They hold no state; callers pass the
//! relevant [`SecurityConfig`] slice.

use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;
use thiserror::Error;
use url::Url;

use crate::config::SecurityConfig;
use crate::services::ServiceDefinition;

/// Rejection reasons produced by the guard.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    /// URL scheme outside the http/https whitelist.
    #[error("scheme '{0}' is not allowed")]
    Scheme(String),

    /// Hostname not covered by the upstream allowlist.
    #[error("host '{0}' is not in the upstream allowlist")]
    HostNotAllowed(String),

    /// Host literal falls in a blocked private/reserved range.
    #[error("host '{0}' is a blocked private address")]
    PrivateAddress(String),

    /// Constructed URL host diverged from the configured upstream host.
    #[error("constructed host '{constructed}' does not match upstream host '{expected}'")]
    HostMismatch {
        constructed: String,
        expected: String,
    },

    /// URL missing a host or otherwise unusable.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Check a hostname against the upstream allowlist.
///
/// An empty allowlist admits everything (back-compat). A non-empty
/// allowlist admits exact matches and dotted-suffix subdomains:
/// `example.com` admits `api.example.com` but not `evilexample.com`.
///
/// ```rust
/// use clawguard_core::guard::host_allowlisted;
///
/// let allow = vec!["example.com".to_string()];
/// assert!(host_allowlisted("example.com", &allow));
/// assert!(host_allowlisted("api.example.com", &allow));
/// assert!(!host_allowlisted("evilexample.com", &allow));
/// assert!(host_allowlisted("anything.example", &[]));
/// ```
pub fn host_allowlisted(host: &str, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    allowlist
        .iter()
        .any(|entry| host == entry.as_str() || host.ends_with(&format!(".{entry}")))
}

/// Whether a host literal is a blocked private/reserved address.
///
/// Matches on the literal only; hostnames that merely *resolve* to
/// private space are the province of [`advisory_dns_check`].
pub fn is_private_host(host: &str) -> bool {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    let Ok(addr) = literal.parse::<IpAddr>() else {
        return false;
    };
    match addr {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_v4(mapped);
            }
            let seg = v6.segments()[0];
            v6.is_loopback() || (seg & 0xfe00) == 0xfc00 || (seg & 0xffc0) == 0xfe80
        }
    }
}

fn is_private_v4(v4: Ipv4Addr) -> bool {
    // 127/8, 10/8, 172.16/12, 192.168/16, 169.254/16, 0/8
    v4.is_loopback()
        || v4.is_private()
        || v4.is_link_local()
        || v4.octets()[0] == 0
}

/// Protocol whitelist: only plain and TLS HTTP pass.
pub fn scheme_allowed(scheme: &str) -> bool {
    matches!(scheme, "http" | "https")
}

/// Full static check of an upstream URL: scheme, allowlist, private-IP.
pub fn check_upstream_url(url: &Url, security: &SecurityConfig) -> Result<(), GuardError> {
    if !scheme_allowed(url.scheme()) {
        return Err(GuardError::Scheme(url.scheme().to_string()));
    }
    let host = url
        .host_str()
        .ok_or_else(|| GuardError::InvalidUrl(format!("{url} has no host")))?;
    if !host_allowlisted(host, &security.allowed_upstream_hosts) {
        return Err(GuardError::HostNotAllowed(host.to_string()));
    }
    if security.block_private_ips && is_private_host(host) {
        return Err(GuardError::PrivateAddress(host.to_string()));
    }
    Ok(())
}

/// Runtime host-pin: the constructed URL must still point at the
/// configured upstream host, byte for byte.
///
/// This catches path remainders that a URL resolver honors as a new
/// authority (protocol-relative `//other.example/...` segments and
/// similar), as well as any scheme switch.
pub fn pin_upstream_host(constructed: &Url, base: &Url) -> Result<(), GuardError> {
    if constructed.scheme() != base.scheme() {
        return Err(GuardError::Scheme(constructed.scheme().to_string()));
    }
    let constructed_host = constructed
        .host_str()
        .ok_or_else(|| GuardError::InvalidUrl(format!("{constructed} has no host")))?;
    let expected = base
        .host_str()
        .ok_or_else(|| GuardError::InvalidUrl(format!("{base} has no host")))?;
    if constructed_host != expected {
        return Err(GuardError::HostMismatch {
            constructed: constructed_host.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Re-validate an upstream redirect target.
///
/// Resolves `location` against the URL the response came from, then
/// applies the host-pin plus the allowlist and private-IP rules.
/// Returns the resolved target on success.
pub fn check_redirect(
    location: &str,
    current: &Url,
    base: &Url,
    security: &SecurityConfig,
) -> Result<Url, GuardError> {
    let target = current
        .join(location)
        .map_err(|e| GuardError::InvalidUrl(format!("{location}: {e}")))?;
    pin_upstream_host(&target, base)?;
    check_upstream_url(&target, security)?;
    Ok(target)
}

/// Validate one service definition against the loaded security policy.
///
/// Every definition in the live service table must pass this check,
/// whether it came from bootstrap config or from an override.
pub fn validate_service(
    def: &ServiceDefinition,
    security: &SecurityConfig,
) -> Result<(), GuardError> {
    check_upstream_url(&def.upstream, security)
}

/// IP allowlist check for the admin surface.
///
/// Entries are exact IPv4 addresses or CIDR blocks `a.b.c.d/prefix`.
/// IPv4-mapped IPv6 clients are compared after stripping `::ffff:`.
pub fn client_ip_allowed(client_ip: &str, allowlist: &[String]) -> bool {
    let literal = client_ip.strip_prefix("::ffff:").unwrap_or(client_ip);
    let Ok(addr) = literal.parse::<Ipv4Addr>() else {
        return false;
    };
    allowlist.iter().any(|entry| {
        if entry.contains('/') {
            entry
                .parse::<Ipv4Net>()
                .map(|net| net.contains(&addr))
                .unwrap_or(false)
        } else {
            entry.parse::<Ipv4Addr>().map(|e| e == addr).unwrap_or(false)
        }
    })
}

/// Advisory DNS check, invoked at config load only.
///
/// Resolves the hostname and warns when any answer lands in blocked
/// address space. Never fails the caller.
pub async fn advisory_dns_check(host: &str) {
    match tokio::net::lookup_host((host, 443)).await {
        Ok(addrs) => {
            for addr in addrs {
                if is_private_host(&addr.ip().to_string()) {
                    tracing::warn!(
                        host,
                        resolved = %addr.ip(),
                        "upstream hostname resolves to a private address"
                    );
                }
            }
        }
        Err(e) => {
            tracing::warn!(host, error = %e, "upstream hostname did not resolve");
        }
    }
}
