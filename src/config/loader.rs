//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{ConsoleConfig, TierLimits};
use crate::config::validation::{validate_config, ValidationError};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "CONSOLE_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {reason}")]
    Env { name: String, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: TOML file (if given), then `CONSOLE_*` environment
/// overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<ConsoleConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ConsoleConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    ensure_signing_secret(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `CONSOLE_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut ConsoleConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| {
        let name = format!("{}{}", ENV_PREFIX, suffix);
        lookup(&name).map(|value| (name, value))
    };

    if let Some((_, v)) = var("BIND_ADDRESS") {
        config.listener.bind_address = v;
    }
    if let Some((_, v)) = var("JWT_SECRET") {
        config.auth.jwt_secret = v;
    }
    if let Some((name, v)) = var("TOKEN_TTL_SECS") {
        config.auth.token_ttl_secs = v.trim().parse().map_err(|e| ConfigError::Env {
            name,
            reason: format!("{}", e),
        })?;
    }
    if let Some((name, v)) = var("RATE_GENERAL") {
        config.rate_limit.general = parse_tier(&name, &v)?;
    }
    if let Some((name, v)) = var("RATE_AUTH") {
        config.rate_limit.auth = parse_tier(&name, &v)?;
    }
    if let Some((name, v)) = var("RATE_STRICT") {
        config.rate_limit.strict = parse_tier(&name, &v)?;
    }
    if let Some((_, v)) = var("SENSITIVE_PREFIXES") {
        config.rate_limit.sensitive_prefixes = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some((_, v)) = var("LOG_LEVEL") {
        config.observability.log_level = v;
    }
    if let Some((_, v)) = var("ADMIN_EMAIL") {
        config.bootstrap.admin_email = v;
    }
    if let Some((_, v)) = var("ADMIN_PASSWORD") {
        config.bootstrap.admin_password = v;
    }

    Ok(())
}

/// Parse `"<rate>,<burst>"`. A single number sets both.
fn parse_tier(name: &str, value: &str) -> Result<TierLimits, ConfigError> {
    let invalid = |reason: String| ConfigError::Env {
        name: name.to_string(),
        reason,
    };

    let mut parts = value.split(',').map(str::trim);
    let rate: u32 = parts
        .next()
        .unwrap_or_default()
        .parse()
        .map_err(|e| invalid(format!("rate: {}", e)))?;
    let burst: u32 = match parts.next() {
        Some(b) => b.parse().map_err(|e| invalid(format!("burst: {}", e)))?,
        None => rate,
    };
    if parts.next().is_some() {
        return Err(invalid("expected \"<rate>,<burst>\"".to_string()));
    }

    Ok(TierLimits::new(rate, burst))
}

/// Generate a throwaway signing secret when none is configured.
fn ensure_signing_secret(config: &mut ConsoleConfig) {
    if config.auth.jwt_secret.is_empty() {
        config.auth.jwt_secret = format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple());
        tracing::warn!("No signing secret configured; generated an ephemeral one. Tokens will not survive a restart.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = ConsoleConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("CONSOLE_JWT_SECRET", "s"),
                ("CONSOLE_RATE_AUTH", "30, 10"),
                ("CONSOLE_RATE_STRICT", "3"),
                ("CONSOLE_SENSITIVE_PREFIXES", "/api/a, /api/b,"),
            ]),
        )
        .unwrap();

        assert_eq!(config.auth.jwt_secret, "s");
        assert_eq!(config.rate_limit.auth, TierLimits::new(30, 10));
        assert_eq!(config.rate_limit.strict, TierLimits::new(3, 3));
        assert_eq!(config.rate_limit.sensitive_prefixes, vec!["/api/a", "/api/b"]);
    }

    #[test]
    fn bad_tier_value_names_the_variable() {
        let mut config = ConsoleConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("CONSOLE_RATE_GENERAL", "fast")])).unwrap_err();
        assert!(err.to_string().contains("CONSOLE_RATE_GENERAL"));

        let err = apply_env_overrides(&mut config, env(&[("CONSOLE_RATE_GENERAL", "1,2,3")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn missing_secret_is_generated() {
        let mut config = ConsoleConfig::default();
        ensure_signing_secret(&mut config);
        assert_eq!(config.auth.jwt_secret.len(), 64);
    }
}
