//! Per-service request policy.
//!
//! A policy is an ordered rule list plus a default action. Rules are
//! evaluated in declared order against the upstream method and path;
//! the first matching rule wins, and a request matching no rule falls
//! back to the service default.

use serde::{Deserialize, Serialize};

/// What the gateway does with a request once it is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Forward immediately, no human in the loop.
    AutoApprove,

    /// Suspend until a live grant exists or a human decides.
    #[default]
    RequireApproval,
}

/// A single policy rule.
///
/// Both predicates are optional; an absent predicate matches anything.
/// The method predicate is a case-insensitive equality match, the path
/// predicate a prefix match on the upstream path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// HTTP method this rule applies to, e.g. `GET`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Upstream path prefix this rule applies to, e.g. `/repos`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,

    /// Action taken when the rule matches.
    pub action: Action,
}

impl PolicyRule {
    fn matches(&self, method: &str, path: &str) -> bool {
        if let Some(m) = &self.method {
            if !m.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            if !path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Ordered rules plus the fallback action for one service.
///
/// # Example
///
/// ```rust
/// use clawguard_core::policy::{Action, PolicyRule, ServicePolicy};
///
/// let policy = ServicePolicy {
///     default_action: Action::RequireApproval,
///     rules: vec![PolicyRule {
///         method: Some("GET".into()),
///         path_prefix: None,
///         action: Action::AutoApprove,
///     }],
/// };
///
/// assert_eq!(policy.resolve("get", "/user"), Action::AutoApprove);
/// assert_eq!(policy.resolve("DELETE", "/repos/a/b"), Action::RequireApproval);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServicePolicy {
    /// Action when no rule matches.
    #[serde(default)]
    pub default_action: Action,

    /// Rules evaluated in declared order; first match wins.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl ServicePolicy {
    /// Resolve the action for a request against this policy.
    ///
    /// `path` is the upstream path, i.e. the request target after the
    /// routing layer removed the service prefix.
    pub fn resolve(&self, method: &str, path: &str) -> Action {
        for rule in &self.rules {
            if rule.matches(method, path) {
                return rule.action;
            }
        }
        self.default_action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(method: Option<&str>, prefix: Option<&str>, action: Action) -> PolicyRule {
        PolicyRule {
            method: method.map(String::from),
            path_prefix: prefix.map(String::from),
            action,
        }
    }

    #[test]
    fn test_empty_policy_uses_default() {
        let policy = ServicePolicy::default();
        assert_eq!(policy.resolve("GET", "/user"), Action::RequireApproval);

        let policy = ServicePolicy {
            default_action: Action::AutoApprove,
            rules: vec![],
        };
        assert_eq!(policy.resolve("DELETE", "/repos"), Action::AutoApprove);
    }

    #[test]
    fn test_method_match_is_case_insensitive() {
        let policy = ServicePolicy {
            default_action: Action::RequireApproval,
            rules: vec![rule(Some("GET"), None, Action::AutoApprove)],
        };
        assert_eq!(policy.resolve("get", "/x"), Action::AutoApprove);
        assert_eq!(policy.resolve("GET", "/x"), Action::AutoApprove);
        assert_eq!(policy.resolve("POST", "/x"), Action::RequireApproval);
    }

    #[test]
    fn test_path_prefix_match() {
        let policy = ServicePolicy {
            default_action: Action::RequireApproval,
            rules: vec![rule(None, Some("/public"), Action::AutoApprove)],
        };
        assert_eq!(policy.resolve("POST", "/public/items"), Action::AutoApprove);
        assert_eq!(policy.resolve("POST", "/private"), Action::RequireApproval);
    }

    #[test]
    fn test_first_match_wins_in_declared_order() {
        let policy = ServicePolicy {
            default_action: Action::AutoApprove,
            rules: vec![
                rule(Some("DELETE"), None, Action::RequireApproval),
                rule(None, Some("/repos"), Action::AutoApprove),
            ],
        };
        // DELETE /repos matches the first rule, not the second.
        assert_eq!(policy.resolve("DELETE", "/repos/a"), Action::RequireApproval);
        assert_eq!(policy.resolve("GET", "/repos/a"), Action::AutoApprove);
    }

    #[test]
    fn test_both_predicates_must_match() {
        let policy = ServicePolicy {
            default_action: Action::RequireApproval,
            rules: vec![rule(Some("GET"), Some("/user"), Action::AutoApprove)],
        };
        assert_eq!(policy.resolve("GET", "/user"), Action::AutoApprove);
        assert_eq!(policy.resolve("GET", "/repos"), Action::RequireApproval);
        assert_eq!(policy.resolve("POST", "/user"), Action::RequireApproval);
    }

    #[test]
    fn test_action_serde_names() {
        let json = serde_json::to_string(&Action::AutoApprove).unwrap();
        assert_eq!(json, "\"auto_approve\"");
        let parsed: Action = serde_json::from_str("\"require_approval\"").unwrap();
        assert_eq!(parsed, Action::RequireApproval);
    }
}
