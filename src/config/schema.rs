//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the console.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::security::access_list::AccessList;
use crate::security::rate_limit::DEFAULT_WINDOW;

/// Root configuration for the console.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Token signing and role settings.
    pub auth: AuthConfig,

    /// Rate limiting tiers and tier selection table.
    pub rate_limit: RateLimitConfig,

    /// Access lists guarding console paths.
    pub access_control: AccessControlConfig,

    /// Initial administrator account.
    pub bootstrap: BootstrapConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for a request in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Credential settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for signing and validating bearer tokens.
    /// Left empty, an ephemeral secret is generated at startup.
    #[serde(skip_serializing)]
    pub jwt_secret: String,

    /// `iss` claim written to and required on tokens.
    pub issuer: String,

    /// Lifetime of issued tokens in seconds.
    pub token_ttl_secs: u64,

    /// Role that unlocks admin-only routes and bypasses ownership checks.
    pub admin_role: String,

    /// Bcrypt cost for hashing bootstrap passwords.
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "proxy-console".to_string(),
            token_ttl_secs: 24 * 60 * 60,
            admin_role: "admin".to_string(),
            bcrypt_cost: crate::directory::password::DEFAULT_BCRYPT_COST,
        }
    }
}

/// Quota for one limiter tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TierLimits {
    /// Sustained requests per minute.
    pub rate_per_minute: u32,

    /// Tokens granted per window, capped at `rate_per_minute`.
    pub burst_capacity: u32,
}

impl TierLimits {
    pub const fn new(rate_per_minute: u32, burst_capacity: u32) -> Self {
        Self {
            rate_per_minute,
            burst_capacity,
        }
    }

    /// Tokens per one-minute window. A burst above the per-minute rate is
    /// capped so no window ever admits more than `rate_per_minute`.
    pub fn capacity(&self) -> u32 {
        self.burst_capacity.min(self.rate_per_minute)
    }

    /// Windows always reset one minute after they open.
    pub fn window(&self) -> Duration {
        DEFAULT_WINDOW
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Lenient tier for ordinary traffic.
    pub general: TierLimits,

    /// Tier for the token endpoints.
    pub auth: TierLimits,

    /// Tier for deletes and sensitive writes.
    pub strict: TierLimits,

    /// Paths that select the auth tier (exact match).
    pub auth_paths: Vec<String>,

    /// Path prefixes whose writes select the strict tier.
    pub sensitive_prefixes: Vec<String>,

    /// Seconds between eviction sweeps.
    pub eviction_interval_secs: u64,

    /// Seconds a visitor may stay idle before eviction.
    pub retention_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            general: TierLimits::new(100, 100),
            auth: TierLimits::new(10, 10),
            strict: TierLimits::new(5, 5),
            auth_paths: vec!["/api/tokens".to_string(), "/api/tokens/refresh".to_string()],
            sensitive_prefixes: vec![
                "/api/nginx/certificates".to_string(),
                "/api/users".to_string(),
                "/api/settings".to_string(),
            ],
            eviction_interval_secs: 5 * 60,
            retention_secs: 60 * 60,
        }
    }
}

/// Binds a path prefix to the access list that guards it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccessListBinding {
    pub path_prefix: String,
    pub access_list_id: i64,
}

/// Access list configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessControlConfig {
    /// Checked in order; the first matching prefix wins.
    pub bindings: Vec<AccessListBinding>,

    /// Access list definitions loaded into the store at startup.
    pub access_lists: Vec<AccessList>,
}

/// Initial administrator account.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub admin_email: String,

    #[serde(skip_serializing)]
    pub admin_password: String,

    pub admin_name: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_email: "admin@example.com".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            admin_password: "changeme".to_string(),
            admin_name: "Administrator".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_one_minute_and_capacity_never_exceeds_rate() {
        assert_eq!(TierLimits::new(100, 100).window(), Duration::from_secs(60));
        assert_eq!(TierLimits::new(120, 20).window(), Duration::from_secs(60));
        assert_eq!(TierLimits::new(120, 20).capacity(), 20);
        assert_eq!(TierLimits::new(10, 50).capacity(), 10);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: ConsoleConfig = toml::from_str(
            r#"
            [rate_limit.strict]
            rate_per_minute = 2
            burst_capacity = 2

            [[access_control.bindings]]
            path_prefix = "/api/nginx"
            access_list_id = 1

            [[access_control.access_lists]]
            id = 1
            rules = [
                { kind = "cidr", directive = "allow", subnet = "10.0.0.0/8" },
                { kind = "exact-ip", directive = "deny", address = "10.0.0.5" },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.rate_limit.strict, TierLimits::new(2, 2));
        assert_eq!(config.rate_limit.general, TierLimits::new(100, 100));
        assert_eq!(config.access_control.access_lists[0].rules.len(), 2);
        assert!(config.access_control.access_lists[0].rules[1].enabled);
        assert_eq!(config.listener.bind_address, "0.0.0.0:8081");
    }
}
