//! Identity carried by bearer tokens.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Claims inside a console token. Decoded fresh for every request and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (user id).
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expires at (Unix seconds).
    pub exp: i64,
    pub iss: String,
}

impl IdentityClaims {
    pub fn subject_id(&self) -> &str {
        &self.sub
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// The caller of a request after the authentication step.
///
/// Inserted into request extensions by the guard middleware so handlers can
/// extract it with `Extension<Caller>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(AuthenticatedUser),
}

impl Caller {
    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            Caller::User(user) => Some(user),
            Caller::Anonymous => None,
        }
    }
}

/// A caller whose token validated and whose subject the directory knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub claims: IdentityClaims,
    /// Token roles that the directory still grants.
    pub roles: BTreeSet<String>,
}

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.claims.sub
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}
