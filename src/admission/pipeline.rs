//! The per-request decision chain.
//!
//! ```text
//! request
//!     → decode bearer credential (pure, no collaborator call)
//!     → derive client key (user id > api key > address)
//!     → select tier → TokenBucketLimiter::check        ─ 429
//!     → bound access list: network gate, credential gate ─ 400 / 403
//!     → [route] AuthorizationGuard::admit                ─ 401 / 403
//!     → handler
//! ```
//!
//! The first failing check ends the chain. Limiter tokens are spent before
//! any collaborator is consulted, so a request cancelled later still counts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, Method};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::auth::claims::Caller;
use crate::auth::guard::{AuthorizationGuard, PresentedCredential, Requirement};
use crate::auth::token::{extract_bearer, CredentialValidator};
use crate::config::{AccessListBinding, ConsoleConfig};
use crate::directory::{AccessListStore, IdentityDirectory, PasswordVerifier};
use crate::error::AdmissionError;
use crate::observability::metrics;
use crate::security::access_list::{check_credentials, check_ip_access, BasicCredentials};
use crate::security::client::{client_address, derive_client_key, ClientKey};
use crate::security::clock::Clock;
use crate::security::rate_limit::RateDecision;
use crate::security::tiers::{has_segment_prefix, RateLimitTier, TierLimiters, TierSelector};

/// Header carrying access-list basic credentials.
pub const PROXY_AUTHORIZATION: &str = "proxy-authorization";

/// External subsystems the pipeline consults.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn IdentityDirectory>,
    pub access_lists: Arc<dyn AccessListStore>,
    pub verifier: Arc<dyn PasswordVerifier>,
}

/// What the pipeline needs to know about a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestFacts<'a> {
    pub path: &'a str,
    pub method: &'a Method,
    pub headers: &'a HeaderMap,
    pub peer: Option<SocketAddr>,
}

/// Result of the pre-routing stages.
#[derive(Debug, Clone)]
pub struct Admission {
    pub tier: RateLimitTier,
    pub key: ClientKey,
    /// `None` when rate limiting is disabled.
    pub decision: Option<RateDecision>,
    pub credential: PresentedCredential,
}

/// Constructed once at startup and shared by every request.
#[derive(Debug)]
pub struct AdmissionPipeline {
    selector: TierSelector,
    limiters: TierLimiters,
    rate_limit_enabled: bool,
    eviction_interval: Duration,
    validator: CredentialValidator,
    guard: AuthorizationGuard,
    access_lists: Arc<dyn AccessListStore>,
    verifier: Arc<dyn PasswordVerifier>,
    bindings: Vec<AccessListBinding>,
}

impl AdmissionPipeline {
    pub fn new(config: &ConsoleConfig, collaborators: Collaborators, clock: Arc<dyn Clock>) -> Self {
        let rl = &config.rate_limit;

        tracing::info!(
            enabled = rl.enabled,
            general = ?rl.general,
            auth = ?rl.auth,
            strict = ?rl.strict,
            bindings = config.access_control.bindings.len(),
            "Admission pipeline configured"
        );

        Self {
            selector: TierSelector::from_config(rl),
            limiters: TierLimiters::from_config(rl, clock),
            rate_limit_enabled: rl.enabled,
            eviction_interval: Duration::from_secs(rl.eviction_interval_secs),
            validator: CredentialValidator::from_config(&config.auth),
            guard: AuthorizationGuard::new(collaborators.directory, config.auth.admin_role.clone()),
            access_lists: collaborators.access_lists,
            verifier: collaborators.verifier,
            bindings: config.access_control.bindings.clone(),
        }
    }

    /// Run every stage that does not depend on the matched route.
    pub async fn admit(&self, request: RequestFacts<'_>) -> Result<Admission, AdmissionError> {
        let credential = self.present_credential(header_str(request.headers, "authorization"));
        let key = derive_client_key(credential.subject(), request.headers, request.peer);
        let tier = self.selector.select(request.path, request.method);

        let decision = if self.rate_limit_enabled {
            Some(self.rate_limit(tier, &key)?)
        } else {
            None
        };

        self.check_access_list(request).await?;

        metrics::record_admitted(tier.as_str());
        Ok(Admission {
            tier,
            key,
            decision,
            credential,
        })
    }

    /// Decode the `Authorization` header without consulting the directory.
    pub fn present_credential(&self, authorization: Option<&str>) -> PresentedCredential {
        match extract_bearer(authorization) {
            None => PresentedCredential::Missing,
            Some(token) => match self.validator.validate(token) {
                Ok(claims) => PresentedCredential::Valid(claims),
                Err(err) => PresentedCredential::Rejected(err),
            },
        }
    }

    /// Spend one token from `key`'s bucket in `tier`.
    pub fn rate_limit(&self, tier: RateLimitTier, key: &ClientKey) -> Result<RateDecision, AdmissionError> {
        let key = key.to_string();
        let decision = self.limiters.get(tier).check(&key);

        if decision.allowed {
            return Ok(decision);
        }

        tracing::warn!(tier = %tier, key = %key, retry_after_ms = decision.reset_after.as_millis() as u64, "Rate limit exceeded");
        metrics::record_rate_limited(tier.as_str());
        Err(AdmissionError::RateLimitExceeded {
            tier,
            retry_after: decision.reset_after,
        })
    }

    /// The access list bound to `path`, if any. Prefixes match whole path
    /// segments and the first match wins.
    pub fn binding_for(&self, path: &str) -> Option<&AccessListBinding> {
        self.bindings.iter().find(|b| has_segment_prefix(path, &b.path_prefix))
    }

    /// Network gate then credential gate for the list bound to the path.
    pub async fn check_access_list(&self, request: RequestFacts<'_>) -> Result<(), AdmissionError> {
        let Some(binding) = self.binding_for(request.path) else {
            return Ok(());
        };
        let list_id = binding.access_list_id;

        let list = match self.access_lists.fetch_access_list(list_id).await {
            Ok(Some(list)) => list,
            Ok(None) => {
                tracing::error!(list_id, path = %request.path, "Bound access list missing from store");
                return Err(AdmissionError::AccessListDenied(list_id));
            }
            Err(e) => {
                tracing::error!(list_id, error = %e, "authorization subsystem degraded: access list fetch failed");
                metrics::record_authorization_degraded("fetch_access_list");
                return Err(AdmissionError::AccessListDenied(list_id));
            }
        };

        let candidate = client_address(request.headers, request.peer).unwrap_or_else(|| "unknown".to_string());
        if !check_ip_access(&list, &candidate)? {
            tracing::warn!(list_id, candidate = %candidate, "Access list network gate denied");
            return Err(AdmissionError::AccessListDenied(list_id));
        }

        let presented = header_str(request.headers, PROXY_AUTHORIZATION).and_then(BasicCredentials::parse);
        match check_credentials(&list, presented.as_ref(), self.verifier.as_ref()).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(list_id, username = ?presented.as_ref().map(|c| c.username.as_str()), "Access list credential gate denied");
                Err(AdmissionError::AccessListDenied(list_id))
            }
            Err(e) => {
                tracing::error!(list_id, error = %e, "authorization subsystem degraded: credential verification failed");
                metrics::record_authorization_degraded("verify_password");
                Err(AdmissionError::AccessListDenied(list_id))
            }
        }
    }

    /// Route-level authentication and authorization.
    pub async fn authorize(
        &self,
        credential: &PresentedCredential,
        requirement: &Requirement,
        owner_id: Option<&str>,
    ) -> Result<Caller, AdmissionError> {
        self.guard.admit(credential, requirement, owner_id).await
    }

    /// Start the per-tier eviction sweeps.
    pub fn spawn_eviction(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        self.limiters.spawn_eviction(self.eviction_interval, shutdown)
    }

    pub fn limiters(&self) -> &TierLimiters {
        &self.limiters
    }

    pub fn selector(&self) -> &TierSelector {
        &self.selector
    }

    pub fn validator(&self) -> &CredentialValidator {
        &self.validator
    }

    pub fn guard(&self) -> &AuthorizationGuard {
        &self.guard
    }

    pub fn rate_limit_enabled(&self) -> bool {
        self.rate_limit_enabled
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{BcryptVerifier, MemoryDirectory};
    use crate::security::access_list::{AccessList, AccessRule, Directive};
    use crate::security::clock::ManualClock;
    use axum::http::HeaderValue;

    const SECRET: &str = "pipeline-test-secret-0123456789abcdef";

    fn pipeline(configure: impl FnOnce(&mut ConsoleConfig)) -> (AdmissionPipeline, MemoryDirectory, ManualClock) {
        let mut config = ConsoleConfig::default();
        config.auth.jwt_secret = SECRET.to_string();
        configure(&mut config);

        let directory = MemoryDirectory::new(Arc::new(BcryptVerifier));
        for list in &config.access_control.access_lists {
            directory.put_access_list(list.clone());
        }
        let clock = ManualClock::default();
        let collaborators = Collaborators {
            directory: Arc::new(directory.clone()),
            access_lists: Arc::new(directory.clone()),
            verifier: Arc::new(BcryptVerifier),
        };
        (
            AdmissionPipeline::new(&config, collaborators, Arc::new(clock.clone())),
            directory,
            clock,
        )
    }

    fn facts<'a>(path: &'a str, method: &'a Method, headers: &'a HeaderMap) -> RequestFacts<'a> {
        RequestFacts {
            path,
            method,
            headers,
            peer: Some("192.0.2.1:5000".parse().unwrap()),
        }
    }

    #[tokio::test]
    async fn valid_token_keys_by_user() {
        let (p, _, _) = pipeline(|_| {});
        let (token, _) = p.validator().issue("42", "", &Default::default()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(&format!("Bearer {}", token)).unwrap());
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7"));

        let admission = p.admit(facts("/api/users/me", &Method::GET, &headers)).await.unwrap();
        assert_eq!(admission.key, ClientKey::User("42".into()));
        assert_eq!(admission.tier, RateLimitTier::General);
        assert!(matches!(admission.credential, PresentedCredential::Valid(_)));
    }

    #[tokio::test]
    async fn bad_token_falls_back_to_address_key() {
        let (p, _, _) = pipeline(|_| {});
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer garbage"));

        let admission = p.admit(facts("/api/tokens", &Method::POST, &headers)).await.unwrap();
        assert_eq!(admission.key, ClientKey::Ip("192.0.2.1".into()));
        assert_eq!(admission.tier, RateLimitTier::Auth);
        assert!(matches!(
            admission.credential,
            PresentedCredential::Rejected(AdmissionError::CredentialMalformed(_))
        ));
    }

    #[tokio::test]
    async fn strict_tier_exhausts_and_reports_retry_after() {
        let (p, _, _) = pipeline(|c| c.rate_limit.strict = crate::config::TierLimits::new(2, 2));
        let headers = HeaderMap::new();

        for _ in 0..2 {
            p.admit(facts("/api/users/7", &Method::DELETE, &headers)).await.unwrap();
        }
        match p.admit(facts("/api/users/7", &Method::DELETE, &headers)).await {
            Err(AdmissionError::RateLimitExceeded { tier, retry_after }) => {
                assert_eq!(tier, RateLimitTier::Strict);
                assert!(retry_after <= Duration::from_secs(60));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Other tiers are unaffected.
        assert!(p.admit(facts("/api/users/7", &Method::GET, &headers)).await.is_ok());
    }

    #[tokio::test]
    async fn disabled_rate_limiting_never_throttles() {
        let (p, _, _) = pipeline(|c| {
            c.rate_limit.enabled = false;
            c.rate_limit.general = crate::config::TierLimits::new(1, 1);
        });
        let headers = HeaderMap::new();
        for _ in 0..5 {
            let admission = p.admit(facts("/health", &Method::GET, &headers)).await.unwrap();
            assert!(admission.decision.is_none());
        }
    }

    #[tokio::test]
    async fn bound_access_list_applies_deny_precedence() {
        let (p, _, _) = pipeline(|c| {
            c.access_control.access_lists = vec![AccessList::new(
                3,
                "1",
                vec![
                    AccessRule::cidr(Directive::Allow, "10.0.0.0/24"),
                    AccessRule::ip(Directive::Deny, "10.0.0.5"),
                ],
            )];
            c.access_control.bindings = vec![AccessListBinding {
                path_prefix: "/api/nginx".into(),
                access_list_id: 3,
            }];
        });

        let mut denied = HeaderMap::new();
        denied.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.5"));
        assert!(matches!(
            p.admit(facts("/api/nginx/proxy-hosts", &Method::GET, &denied)).await,
            Err(AdmissionError::AccessListDenied(3))
        ));

        let mut allowed = HeaderMap::new();
        allowed.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.9"));
        assert!(p.admit(facts("/api/nginx/proxy-hosts", &Method::GET, &allowed)).await.is_ok());

        // Unbound paths skip the list entirely.
        assert!(p.admit(facts("/api/users/me", &Method::GET, &denied)).await.is_ok());
    }

    #[tokio::test]
    async fn binding_does_not_gate_sibling_paths() {
        let (p, _, _) = pipeline(|c| {
            c.access_control.access_lists = vec![AccessList::new(
                3,
                "1",
                vec![AccessRule::ip(Directive::Deny, "10.0.0.5")],
            )];
            c.access_control.bindings = vec![AccessListBinding {
                path_prefix: "/api/users".into(),
                access_list_id: 3,
            }];
        });
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.5"));

        assert!(p.binding_for("/api/usersettings").is_none());
        assert!(p.admit(facts("/api/usersettings", &Method::GET, &headers)).await.is_ok());

        for bound in ["/api/users", "/api/users/7"] {
            assert!(matches!(
                p.admit(facts(bound, &Method::GET, &headers)).await,
                Err(AdmissionError::AccessListDenied(3))
            ));
        }
    }

    #[tokio::test]
    async fn malformed_candidate_is_bad_request() {
        let (p, _, _) = pipeline(|c| {
            c.access_control.access_lists = vec![AccessList::new(1, "1", vec![])];
            c.access_control.bindings = vec![AccessListBinding {
                path_prefix: "/".into(),
                access_list_id: 1,
            }];
        });
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));

        assert!(matches!(
            p.admit(facts("/health", &Method::GET, &headers)).await,
            Err(AdmissionError::MalformedAddress(_))
        ));
    }

    #[tokio::test]
    async fn missing_bound_list_fails_closed() {
        let (p, directory, _) = pipeline(|c| {
            c.access_control.bindings = vec![AccessListBinding {
                path_prefix: "/api".into(),
                access_list_id: 8,
            }];
        });
        let headers = HeaderMap::new();

        assert!(matches!(
            p.admit(facts("/api/x", &Method::GET, &headers)).await,
            Err(AdmissionError::AccessListDenied(8))
        ));

        directory.put_access_list(AccessList::new(8, "1", vec![]));
        assert!(p.admit(facts("/api/x", &Method::GET, &headers)).await.is_ok());
    }
}
