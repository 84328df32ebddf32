//! Rate limit tiers and tier selection.
//!
//! Three independently configured limiters guard the console: a lenient
//! general tier, a stricter tier for the token endpoints and a very strict
//! tier for destructive or sensitive writes.

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{RateLimitConfig, TierLimits};
use crate::security::clock::Clock;
use crate::security::rate_limit::TokenBucketLimiter;

/// Limiter tier a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    General,
    Auth,
    Strict,
}

impl RateLimitTier {
    pub const ALL: [RateLimitTier; 3] = [Self::General, Self::Auth, Self::Strict];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Auth => "auth",
            Self::Strict => "strict",
        }
    }
}

impl std::fmt::Display for RateLimitTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure mapping from (path, method) to a tier.
#[derive(Debug, Clone)]
pub struct TierSelector {
    auth_paths: Vec<String>,
    sensitive_prefixes: Vec<String>,
}

impl TierSelector {
    pub fn new(auth_paths: Vec<String>, sensitive_prefixes: Vec<String>) -> Self {
        Self {
            auth_paths,
            sensitive_prefixes,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.auth_paths.clone(), config.sensitive_prefixes.clone())
    }

    /// Auth paths match exactly. Any `DELETE`, and writes under a sensitive
    /// prefix, go to the strict tier. Everything else is general.
    pub fn select(&self, path: &str, method: &Method) -> RateLimitTier {
        if self.auth_paths.iter().any(|p| p == path) {
            return RateLimitTier::Auth;
        }

        if *method == Method::DELETE {
            return RateLimitTier::Strict;
        }

        let mutating = [Method::POST, Method::PUT, Method::PATCH].contains(method);
        if mutating && self.sensitive_prefixes.iter().any(|p| has_segment_prefix(path, p)) {
            return RateLimitTier::Strict;
        }

        RateLimitTier::General
    }
}

/// `/api/users` matches `/api/users` and `/api/users/7`, not `/api/usersx`.
pub(crate) fn has_segment_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || prefix.ends_with('/'),
        None => false,
    }
}

/// The three limiter instances, built once at startup.
#[derive(Debug, Clone)]
pub struct TierLimiters {
    general: Arc<TokenBucketLimiter>,
    auth: Arc<TokenBucketLimiter>,
    strict: Arc<TokenBucketLimiter>,
}

impl TierLimiters {
    pub fn from_config(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let retention = Duration::from_secs(config.retention_secs);
        let build = |tier: RateLimitTier, limits: &TierLimits| {
            Arc::new(
                TokenBucketLimiter::new(tier.as_str(), limits.capacity(), limits.window())
                    .with_retention(retention)
                    .with_clock(clock.clone()),
            )
        };

        Self {
            general: build(RateLimitTier::General, &config.general),
            auth: build(RateLimitTier::Auth, &config.auth),
            strict: build(RateLimitTier::Strict, &config.strict),
        }
    }

    pub fn get(&self, tier: RateLimitTier) -> &Arc<TokenBucketLimiter> {
        match tier {
            RateLimitTier::General => &self.general,
            RateLimitTier::Auth => &self.auth,
            RateLimitTier::Strict => &self.strict,
        }
    }

    /// Start one eviction task per tier.
    pub fn spawn_eviction(
        &self,
        every: Duration,
        shutdown: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        RateLimitTier::ALL
            .iter()
            .map(|tier| self.get(*tier).clone().spawn_eviction(every, shutdown.subscribe()))
            .collect()
    }
}
