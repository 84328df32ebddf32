//! Configuration validation.
//!
//! Semantic checks that serde cannot express. All problems are collected
//! and returned together rather than stopping at the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ConsoleConfig, TierLimits};

/// Minimum signing secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("auth.jwt_secret must be at least 32 bytes")]
    WeakSecret,

    #[error("auth.token_ttl_secs must be positive")]
    TokenTtl,

    #[error("auth.admin_role must not be empty")]
    AdminRole,

    #[error("rate_limit.{tier}: rate_per_minute and burst_capacity must be at least 1")]
    TierLimits { tier: &'static str },

    #[error("rate_limit.{field} must be at least 1 second")]
    Interval { field: &'static str },

    #[error("path `{0}` must start with '/'")]
    Path(String),

    #[error("access_control binding `{path_prefix}` references unknown access list {id}")]
    UnknownAccessList { path_prefix: String, id: i64 },

    #[error("access list id {0} is defined more than once")]
    DuplicateAccessList(i64),
}

/// Validate a complete configuration.
pub fn validate_config(config: &ConsoleConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.auth.jwt_secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::WeakSecret);
    }
    if config.auth.token_ttl_secs == 0 {
        errors.push(ValidationError::TokenTtl);
    }
    if config.auth.admin_role.trim().is_empty() {
        errors.push(ValidationError::AdminRole);
    }

    let rl = &config.rate_limit;
    for (tier, limits) in [("general", &rl.general), ("auth", &rl.auth), ("strict", &rl.strict)] {
        if !tier_is_valid(limits) {
            errors.push(ValidationError::TierLimits { tier });
        }
    }
    if rl.eviction_interval_secs == 0 {
        errors.push(ValidationError::Interval {
            field: "eviction_interval_secs",
        });
    }
    if rl.retention_secs == 0 {
        errors.push(ValidationError::Interval { field: "retention_secs" });
    }

    let paths = rl
        .auth_paths
        .iter()
        .chain(rl.sensitive_prefixes.iter())
        .chain(config.access_control.bindings.iter().map(|b| &b.path_prefix));
    for path in paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::Path(path.clone()));
        }
    }

    let mut ids = HashSet::new();
    for list in &config.access_control.access_lists {
        if !ids.insert(list.id) {
            errors.push(ValidationError::DuplicateAccessList(list.id));
        }
    }
    for binding in &config.access_control.bindings {
        if !ids.contains(&binding.access_list_id) {
            errors.push(ValidationError::UnknownAccessList {
                path_prefix: binding.path_prefix.clone(),
                id: binding.access_list_id,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn tier_is_valid(limits: &TierLimits) -> bool {
    limits.rate_per_minute >= 1 && limits.burst_capacity >= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AccessListBinding;
    use crate::security::access_list::AccessList;

    fn valid() -> ConsoleConfig {
        let mut config = ConsoleConfig::default();
        config.auth.jwt_secret = "x".repeat(MIN_SECRET_LEN);
        config
    }

    #[test]
    fn defaults_with_secret_are_valid() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = valid();
        config.auth.jwt_secret = "short".into();
        config.rate_limit.auth = TierLimits::new(0, 5);
        config.rate_limit.sensitive_prefixes.push("api/x".into());
        config.access_control.bindings.push(AccessListBinding {
            path_prefix: "/api".into(),
            access_list_id: 9,
        });

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::WeakSecret));
        assert!(errors.contains(&ValidationError::TierLimits { tier: "auth" }));
        assert!(errors.contains(&ValidationError::Path("api/x".into())));
        assert!(errors.contains(&ValidationError::UnknownAccessList {
            path_prefix: "/api".into(),
            id: 9
        }));
    }

    #[test]
    fn duplicate_access_list_ids_are_rejected() {
        let mut config = valid();
        config.access_control.access_lists = vec![AccessList::new(1, "a", vec![]), AccessList::new(1, "b", vec![])];
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::DuplicateAccessList(1)])
        );
    }
}
