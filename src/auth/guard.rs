//! Authentication and authorization of console requests.
//!
//! Each request walks a small state machine:
//!
//! ```text
//! Unauthenticated ──token valid, subject known──▶ Authenticated ──checks pass──▶ Authorized
//!        │                                              │
//!        └──missing / invalid (required auth)──▶ Denied ◀──role / permission / owner fails
//! ```
//!
//! Optional authentication never reaches `Denied` through the credential:
//! a missing or bad token simply leaves the caller anonymous.
//!
//! Directory failures fail closed. They are logged and counted separately
//! from genuine denials so a degraded directory is distinguishable from a
//! user who lacks access.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::auth::claims::{AuthenticatedUser, Caller, IdentityClaims};
use crate::directory::IdentityDirectory;
use crate::error::AdmissionError;
use crate::observability::metrics;

/// What the pipeline learned from the `Authorization` header before any
/// collaborator was consulted.
#[derive(Debug, Clone)]
pub enum PresentedCredential {
    Missing,
    Valid(IdentityClaims),
    Rejected(AdmissionError),
}

impl PresentedCredential {
    /// Subject of a valid token.
    pub fn subject(&self) -> Option<&str> {
        match self {
            PresentedCredential::Valid(claims) => Some(&claims.sub),
            _ => None,
        }
    }
}

/// Access requirement of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Known and anonymous callers both proceed.
    Optional,
    /// Any authenticated caller.
    Authenticated,
    /// Callers holding the admin role.
    Admin,
    /// Callers the directory grants the named permission.
    Permission(String),
    /// The owner named by a path parameter, or an admin.
    Owner { param: String },
}

impl Requirement {
    pub fn permission(name: impl Into<String>) -> Self {
        Requirement::Permission(name.into())
    }

    pub fn owner(param: impl Into<String>) -> Self {
        Requirement::Owner { param: param.into() }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Requirement::Optional)
    }
}

/// Per-request authorization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    Authorized,
    Denied,
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    Granted,
    AdminRole,
    ResourceOwner,
    PermissionGranted,
    InsufficientRole,
    MissingPermission,
    NotResourceOwner,
    /// The directory could not answer; treated as insufficient role.
    DirectoryUnavailable,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Granted => "granted",
            ReasonCode::AdminRole => "admin_role",
            ReasonCode::ResourceOwner => "resource_owner",
            ReasonCode::PermissionGranted => "permission_granted",
            ReasonCode::InsufficientRole => "insufficient_role",
            ReasonCode::MissingPermission => "missing_permission",
            ReasonCode::NotResourceOwner => "not_resource_owner",
            ReasonCode::DirectoryUnavailable => "directory_unavailable",
        }
    }
}

/// Outcome of one authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: ReasonCode,
}

impl AuthorizationDecision {
    fn allow(reason: ReasonCode) -> Self {
        Self { allowed: true, reason }
    }

    fn deny(reason: ReasonCode) -> Self {
        Self { allowed: false, reason }
    }

    pub fn state(&self) -> AuthState {
        if self.allowed {
            AuthState::Authorized
        } else {
            AuthState::Denied
        }
    }

    /// Map a denial onto the error taxonomy.
    pub fn into_result(self, requirement: &Requirement) -> Result<(), AdmissionError> {
        if self.allowed {
            return Ok(());
        }
        Err(match self.reason {
            ReasonCode::MissingPermission => match requirement {
                Requirement::Permission(name) => AdmissionError::MissingPermission(name.clone()),
                _ => AdmissionError::MissingPermission(String::new()),
            },
            ReasonCode::NotResourceOwner => AdmissionError::NotResourceOwner,
            _ => AdmissionError::InsufficientRole,
        })
    }
}

/// Composes credential outcomes with role, permission and ownership checks.
#[derive(Debug, Clone)]
pub struct AuthorizationGuard {
    directory: Arc<dyn IdentityDirectory>,
    admin_role: String,
}

impl AuthorizationGuard {
    pub fn new(directory: Arc<dyn IdentityDirectory>, admin_role: impl Into<String>) -> Self {
        Self {
            directory,
            admin_role: admin_role.into(),
        }
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    /// Run the whole state machine for one request.
    ///
    /// `owner_id` is the value of the route's owner path parameter, if any.
    pub async fn admit(
        &self,
        credential: &PresentedCredential,
        requirement: &Requirement,
        owner_id: Option<&str>,
    ) -> Result<Caller, AdmissionError> {
        let caller = self.authenticate(credential, requirement.is_optional()).await?;

        let user = match &caller {
            Caller::User(user) => user,
            Caller::Anonymous => return Ok(caller),
        };

        let decision = self.authorize(user, requirement, owner_id).await;
        tracing::debug!(
            subject = %user.id(),
            state = ?decision.state(),
            reason = decision.reason.as_str(),
            "Authorization decided"
        );
        decision.into_result(requirement)?;
        Ok(caller)
    }

    /// `Unauthenticated → Authenticated`, or a terminal denial.
    pub async fn authenticate(
        &self,
        credential: &PresentedCredential,
        optional: bool,
    ) -> Result<Caller, AdmissionError> {
        let claims = match credential {
            PresentedCredential::Valid(claims) => claims,
            PresentedCredential::Missing if optional => return Ok(Caller::Anonymous),
            PresentedCredential::Missing => return Err(AdmissionError::CredentialMissing),
            PresentedCredential::Rejected(err) if optional => {
                tracing::debug!(reason = err.reason(), "Ignoring bad credential on optional-auth route");
                return Ok(Caller::Anonymous);
            }
            PresentedCredential::Rejected(err) => return Err(err.clone()),
        };

        match self.directory.lookup_user_roles(&claims.sub).await {
            Ok(Some(granted)) => {
                let roles: BTreeSet<String> = claims.roles.intersection(&granted).cloned().collect();
                Ok(Caller::User(AuthenticatedUser {
                    claims: claims.clone(),
                    roles,
                }))
            }
            Ok(None) if optional => Ok(Caller::Anonymous),
            Ok(None) => {
                tracing::warn!(subject = %claims.sub, "Token subject unknown or disabled");
                Err(AdmissionError::CredentialInvalid("unknown subject".to_string()))
            }
            Err(e) => {
                tracing::error!(subject = %claims.sub, error = %e, "authorization subsystem degraded: role lookup failed");
                metrics::record_authorization_degraded("lookup_user_roles");
                if optional {
                    Ok(Caller::Anonymous)
                } else {
                    Err(AdmissionError::InsufficientRole)
                }
            }
        }
    }

    /// `Authenticated → {Authorized, Denied}`.
    pub async fn authorize(
        &self,
        user: &AuthenticatedUser,
        requirement: &Requirement,
        owner_id: Option<&str>,
    ) -> AuthorizationDecision {
        let is_admin = user.has_role(&self.admin_role);

        match requirement {
            Requirement::Optional | Requirement::Authenticated => AuthorizationDecision::allow(ReasonCode::Granted),

            Requirement::Admin if is_admin => AuthorizationDecision::allow(ReasonCode::AdminRole),
            Requirement::Admin => AuthorizationDecision::deny(ReasonCode::InsufficientRole),

            Requirement::Permission(permission) => {
                match self.directory.lookup_permission(user.id(), permission).await {
                    Ok(true) => AuthorizationDecision::allow(ReasonCode::PermissionGranted),
                    Ok(false) => AuthorizationDecision::deny(ReasonCode::MissingPermission),
                    Err(e) => {
                        tracing::error!(
                            subject = %user.id(),
                            permission = %permission,
                            error = %e,
                            "authorization subsystem degraded: permission lookup failed"
                        );
                        metrics::record_authorization_degraded("lookup_permission");
                        AuthorizationDecision::deny(ReasonCode::DirectoryUnavailable)
                    }
                }
            }

            Requirement::Owner { .. } if is_admin => AuthorizationDecision::allow(ReasonCode::AdminRole),
            Requirement::Owner { .. } => match owner_id {
                Some(owner) if owner == user.id() => AuthorizationDecision::allow(ReasonCode::ResourceOwner),
                _ => AuthorizationDecision::deny(ReasonCode::NotResourceOwner),
            },
        }
    }
}
