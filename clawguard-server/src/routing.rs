//! Request routing and upstream URL construction.
//!
//! Two routing strategies, tried in order: the first path segment as a
//! service name, then the Host header against each service's intercept
//! hostname list.

use std::sync::Arc;

use clawguard_core::services::{ServiceDefinition, ServiceTable};
use url::Url;

use crate::error::GatewayHttpError;

/// The service a request resolved to, plus the path it carries
/// upstream.
#[derive(Debug)]
pub struct ResolvedRoute {
    pub service: Arc<ServiceDefinition>,

    /// Remainder of the original request target (path + query) after
    /// routing; in host-header mode, the whole original target.
    pub upstream_path: String,
}

/// Resolve a request to a service.
///
/// `target` is the original request target (path plus query), `path`
/// the path portion alone, `host` the Host header if present.
pub fn resolve_route(
    table: &ServiceTable,
    target: &str,
    path: &str,
    host: Option<&str>,
) -> Result<ResolvedRoute, GatewayHttpError> {
    let first_segment = path
        .trim_start_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if let Some(segment) = &first_segment {
        if let Some(service) = table.get(segment) {
            let mut upstream_path = target[1 + segment.len()..].to_string();
            if upstream_path.is_empty() {
                upstream_path.push('/');
            }
            return Ok(ResolvedRoute {
                service,
                upstream_path,
            });
        }
    }

    if let Some(host) = host {
        if let Some(service) = table.match_intercept_host(host) {
            return Ok(ResolvedRoute {
                service,
                upstream_path: target.to_string(),
            });
        }
    }

    match first_segment {
        Some(segment) => Err(GatewayHttpError::UnknownService(segment)),
        None => Err(GatewayHttpError::UnknownHost(
            host.unwrap_or_default().to_string(),
        )),
    }
}

/// Resolve the upstream path against the service's base URL.
///
/// The base URL's own path is preserved: base `https://u.example/api`
/// plus remainder `/x?z=1` yields `https://u.example/api/x?z=1`. The
/// result must still pass the runtime host-pin; a remainder the
/// resolver honors as a new authority comes out with a different host
/// and is rejected there.
pub fn build_upstream_url(base: &Url, upstream_path: &str) -> Result<Url, url::ParseError> {
    let mut target = format!(
        "{}{}",
        base.path().trim_end_matches('/'),
        upstream_path
    );
    if target.is_empty() {
        target.push('/');
    }
    base.join(&target)
}

/// Append a credential query parameter, replacing any same-name
/// parameter the agent supplied.
pub fn inject_query_param(url: &mut Url, name: &str, token: &str) {
    let existing: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &existing {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(name, token);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawguard_core::policy::ServicePolicy;
    use clawguard_core::services::CredentialRecipe;

    fn table() -> ServiceTable {
        let gh = ServiceDefinition {
            name: "gh".to_string(),
            upstream: Url::parse("https://api.github.com").unwrap(),
            intercept_hosts: vec![],
            credentials: CredentialRecipe::Bearer {
                token: "T".to_string(),
            },
            policy: ServicePolicy::default(),
        };
        let intercepted = ServiceDefinition {
            name: "u".to_string(),
            upstream: Url::parse("https://u.example/api").unwrap(),
            intercept_hosts: vec!["u.example".to_string()],
            credentials: CredentialRecipe::Bearer {
                token: "T".to_string(),
            },
            policy: ServicePolicy::default(),
        };
        ServiceTable::new(vec![gh, intercepted])
    }

    #[test]
    fn test_path_prefix_resolution() {
        let table = table();
        let route = resolve_route(&table, "/gh/x/y?z=1", "/gh/x/y", None).unwrap();
        assert_eq!(route.service.name, "gh");
        assert_eq!(route.upstream_path, "/x/y?z=1");
    }

    #[test]
    fn test_bare_service_path_becomes_root() {
        let table = table();
        let route = resolve_route(&table, "/gh", "/gh", None).unwrap();
        assert_eq!(route.upstream_path, "/");
    }

    #[test]
    fn test_host_header_fallback_keeps_whole_target() {
        let table = table();
        let route = resolve_route(&table, "/x?z=1", "/x", Some("u.example:443")).unwrap();
        assert_eq!(route.service.name, "u");
        assert_eq!(route.upstream_path, "/x?z=1");
    }

    #[test]
    fn test_path_match_wins_over_host_match() {
        let table = table();
        let route = resolve_route(&table, "/gh/x", "/gh/x", Some("u.example")).unwrap();
        assert_eq!(route.service.name, "gh");
    }

    #[test]
    fn test_unknown_service_and_host_errors() {
        let table = table();
        let err = resolve_route(&table, "/nope/x", "/nope/x", Some("other.example")).unwrap_err();
        assert!(matches!(err, GatewayHttpError::UnknownService(s) if s == "nope"));

        let err = resolve_route(&table, "/", "/", Some("other.example")).unwrap_err();
        assert!(matches!(err, GatewayHttpError::UnknownHost(_)));
    }

    #[test]
    fn test_upstream_url_preserves_base_path() {
        let base = Url::parse("https://u.example/api").unwrap();
        let url = build_upstream_url(&base, "/x/y?z=1").unwrap();
        assert_eq!(url.as_str(), "https://u.example/api/x/y?z=1");
    }

    #[test]
    fn test_upstream_url_without_base_path() {
        let base = Url::parse("https://api.github.com").unwrap();
        let url = build_upstream_url(&base, "/user").unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/user");

        let url = build_upstream_url(&base, "/").unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/");
    }

    #[test]
    fn test_protocol_relative_remainder_swings_host() {
        // The host-pin rejects this downstream; construction itself
        // must surface the swung authority rather than mask it.
        let base = Url::parse("https://api.github.com").unwrap();
        let url = build_upstream_url(&base, "//evil.example/x").unwrap();
        assert_eq!(url.host_str(), Some("evil.example"));
    }

    #[test]
    fn test_inject_query_param_appends() {
        let mut url = Url::parse("https://api.example.com/v1/items?page=2").unwrap();
        inject_query_param(&mut url, "api_key", "T");
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/items?page=2&api_key=T"
        );
    }

    #[test]
    fn test_inject_query_param_replaces_existing() {
        let mut url = Url::parse("https://api.example.com/v1/items?api_key=evil&page=2").unwrap();
        inject_query_param(&mut url, "api_key", "T");
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/items?page=2&api_key=T"
        );
    }
}
