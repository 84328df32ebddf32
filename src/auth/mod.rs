//! Authentication and authorization.
//!
//! # Data Flow
//! ```text
//! Authorization header
//!     → token.rs (bearer extraction, HS256 validation → IdentityClaims)
//!     → guard.rs (directory lookup, role / permission / ownership checks)
//!     → Caller in request extensions
//! ```

pub mod claims;
pub mod guard;
pub mod token;

pub use claims::{AuthenticatedUser, Caller, IdentityClaims};
pub use guard::{AuthState, AuthorizationDecision, AuthorizationGuard, PresentedCredential, ReasonCode, Requirement};
pub use token::{extract_bearer, CredentialValidator};
