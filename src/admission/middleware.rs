//! Axum glue for the admission pipeline.
//!
//! [`admission`] wraps the whole router and runs the route-independent
//! stages. [`guard`] is installed per route group with `route_layer` and
//! carries that group's [`Requirement`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::RequestExt;

use crate::admission::pipeline::{AdmissionPipeline, RequestFacts};
use crate::auth::guard::{PresentedCredential, Requirement};
use crate::error::AdmissionError;
use crate::observability::metrics;

/// State for one guarded route group.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    pipeline: Arc<AdmissionPipeline>,
    requirement: Requirement,
}

impl RouteGuard {
    pub fn new(pipeline: Arc<AdmissionPipeline>, requirement: Requirement) -> Self {
        Self { pipeline, requirement }
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }
}

/// Rate limiting and access lists, before routing.
///
/// Leaves the decoded credential in the request extensions for [`guard`].
pub async fn admission(
    State(pipeline): State<Arc<AdmissionPipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let facts = RequestFacts {
        path: parts.uri.path(),
        method: &parts.method,
        headers: &parts.headers,
        peer,
    };

    match pipeline.admit(facts).await {
        Ok(admission) => {
            tracing::debug!(tier = %admission.tier, key = %admission.key, "Request admitted");
            parts.extensions.insert(admission.credential);
            next.run(Request::from_parts(parts, body)).await
        }
        Err(err) => reject(err, parts.uri.path()),
    }
}

/// Authentication and authorization for one route group.
///
/// Inserts the resulting [`Caller`](crate::auth::claims::Caller) for handlers.
pub async fn guard(State(route): State<RouteGuard>, mut request: Request<Body>, next: Next) -> Response {
    let credential = match request.extensions().get::<PresentedCredential>() {
        Some(credential) => credential.clone(),
        None => {
            let header = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            route.pipeline.present_credential(header)
        }
    };

    let owner_id = match &route.requirement {
        Requirement::Owner { param } => match request.extract_parts::<Path<HashMap<String, String>>>().await {
            Ok(Path(params)) => params.get(param).cloned(),
            Err(e) => {
                tracing::warn!(param = %param, error = %e, "Owner parameter missing from route");
                None
            }
        },
        _ => None,
    };

    match route
        .pipeline
        .authorize(&credential, &route.requirement, owner_id.as_deref())
        .await
    {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(err) => reject(err, request.uri().path()),
    }
}

fn reject(err: AdmissionError, path: &str) -> Response {
    let reason = err.reason();
    match &err {
        AdmissionError::RateLimitExceeded { .. } => {}
        AdmissionError::MalformedAddress(_) => tracing::info!(path = %path, reason, error = %err, "Request rejected"),
        _ => tracing::warn!(path = %path, reason, error = %err, "Request denied"),
    }
    metrics::record_denied(reason);
    err.into_response()
}
