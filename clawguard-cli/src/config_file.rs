//! Bootstrap configuration: YAML with `${VAR}` environment
//! interpolation.
//!
//! Interpolation happens on the raw text before deserialization, so
//! secrets (agent key, credential tokens, bot token, pairing secret)
//! can stay out of the file. An undefined variable is a hard error,
//! never an empty string silently shipped as a credential.

use std::path::Path;

use anyhow::Context;
use regex::Regex;

use clawguard_core::config::GatewayConfig;

/// Load, interpolate, parse, and validate a config file.
pub fn load(path: &Path) -> anyhow::Result<GatewayConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let interpolated = interpolate_env(&raw)?;
    let config: GatewayConfig = serde_yaml::from_str(&interpolated)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating config file {}", path.display()))?;
    Ok(config)
}

/// Replace every `${VAR}` with the process environment value.
fn interpolate_env(raw: &str) -> anyhow::Result<String> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;
    let mut missing = Vec::new();
    let interpolated = pattern
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            match std::env::var(&caps[1]) {
                Ok(value) => value,
                Err(_) => {
                    missing.push(caps[1].to_string());
                    String::new()
                }
            }
        })
        .into_owned();
    if !missing.is_empty() {
        anyhow::bail!(
            "undefined environment variables in config: {}",
            missing.join(", ")
        );
    }
    Ok(interpolated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_interpolation_replaces_known_variables() {
        std::env::set_var("CLAWGUARD_TEST_KEY", "K");
        let out = interpolate_env("agent_key: ${CLAWGUARD_TEST_KEY}").unwrap();
        assert_eq!(out, "agent_key: K");
    }

    #[test]
    fn test_interpolation_rejects_undefined_variables() {
        let err = interpolate_env("agent_key: ${CLAWGUARD_TEST_UNSET_VAR}").unwrap_err();
        assert!(err.to_string().contains("CLAWGUARD_TEST_UNSET_VAR"));
    }

    #[test]
    fn test_load_full_config() {
        std::env::set_var("CLAWGUARD_TEST_TOKEN", "gh-token");
        let yaml = r#"
agent_key: K
listen:
  host: 127.0.0.1
  port: 8300
security:
  allowed_upstream_hosts: [api.github.com]
services:
  - name: gh
    upstream: https://api.github.com
    credentials:
      type: bearer
      token: ${CLAWGUARD_TEST_TOKEN}
    policy:
      default_action: require_approval
      rules:
        - method: GET
          action: auto_approve
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.agent_key, "K");
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].name, "gh");
        match &config.services[0].credentials {
            clawguard_core::services::CredentialRecipe::Bearer { token } => {
                assert_eq!(token, "gh-token")
            }
            other => panic!("unexpected recipe {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        // Service host outside the allowlist fails validation.
        let yaml = r#"
agent_key: K
security:
  allowed_upstream_hosts: [example.com]
services:
  - name: gh
    upstream: https://api.github.com
    credentials:
      type: bearer
      token: T
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        assert!(load(file.path()).is_err());
    }
}
