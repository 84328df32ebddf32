//! Request admission.
//!
//! [`AdmissionPipeline`] orders the security checks; [`middleware`] plugs it
//! into the axum router.

pub mod middleware;
pub mod pipeline;

pub use middleware::{admission, guard, RouteGuard};
pub use pipeline::{Admission, AdmissionPipeline, Collaborators, RequestFacts};
