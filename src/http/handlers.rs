//! Console API handlers.
//!
//! Every handler here runs after admission; the route group decides which
//! [`Requirement`](crate::auth::Requirement) applied and handlers read the
//! resulting [`Caller`] from the request extensions.

use std::collections::BTreeSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::auth::claims::Caller;
use crate::directory::{AccessListStore, DirectoryError, IdentityDirectory, UserRecord};
use crate::error::error_response;
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identity: String,
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Expiry as RFC 3339.
    pub expires: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyHost {
    pub id: i64,
    pub domain_names: Vec<String>,
    pub forward_host: String,
    pub forward_port: u16,
    pub owner_id: String,
    #[serde(default)]
    pub access_list_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub nice_name: String,
    pub domain_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Certificate {
    pub id: String,
    pub nice_name: String,
    pub domain_names: Vec<String>,
    pub owner_id: String,
    pub created_on: String,
}

fn unavailable(err: DirectoryError) -> Response {
    tracing::error!(error = %err, "Directory request failed");
    error_response(StatusCode::SERVICE_UNAVAILABLE, "Directory unavailable", Some("directory_unavailable"))
}

fn not_found(what: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, format!("{} not found", what), Some("not_found"))
}

/// Only reachable if a route lost its guard.
fn no_caller() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Authentication required", Some("credential_missing"))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "OK",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /api/tokens`
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let user = match state.directory.authenticate(&req.identity, &req.secret).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(identity = %req.identity, "Login failed");
            return error_response(StatusCode::UNAUTHORIZED, "Invalid email or password", Some("credential_invalid"));
        }
        Err(e) => return unavailable(e),
    };

    issue_token(&state, &user.id, &user.email, &user.roles)
}

/// `GET /api/tokens/refresh`
pub async fn refresh(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> Response {
    let Some(user) = caller.user() else {
        return no_caller();
    };
    issue_token(&state, user.id(), &user.claims.email, &user.roles)
}

fn issue_token(state: &AppState, subject: &str, email: &str, roles: &BTreeSet<String>) -> Response {
    match state.pipeline.validator().issue(subject, email, roles) {
        Ok((token, claims)) => {
            let expires = chrono::DateTime::from_timestamp(claims.exp, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            tracing::info!(subject = %subject, "Token issued");
            Json(TokenResponse { token, expires }).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "Token signing failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not issue token", None)
        }
    }
}

/// `GET /api/users/me`
pub async fn current_user(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> Response {
    let Some(user) = caller.user() else {
        return no_caller();
    };
    match state.directory.find_user(user.id()).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => not_found("User"),
        Err(e) => unavailable(e),
    }
}

/// `GET /api/users`
pub async fn list_users(State(state): State<AppState>) -> Response {
    match state.directory.list_users().await {
        Ok(users) => Json(users).into_response(),
        Err(e) => unavailable(e),
    }
}

/// `GET /api/users/{user_id}`
pub async fn get_user(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    match state.directory.find_user(&user_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => not_found("User"),
        Err(e) => unavailable(e),
    }
}

/// `PUT /api/users/{user_id}`
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> Response {
    let mut record: UserRecord = match state.directory.find_user(&user_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found("User"),
        Err(e) => return unavailable(e),
    };

    if let Some(name) = update.name {
        record.name = name;
    }
    if let Some(email) = update.email {
        record.email = email;
    }
    state.directory.upsert_user(record.clone());
    tracing::info!(user_id = %user_id, "User updated");
    Json(record).into_response()
}

/// `DELETE /api/users/{user_id}`
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(caller): Extension<Caller>,
) -> Response {
    if caller.user().map(|u| u.id()) == Some(user_id.as_str()) {
        return error_response(StatusCode::BAD_REQUEST, "You cannot delete yourself", Some("self_delete"));
    }
    match state.directory.remove_user(&user_id) {
        Some(_) => {
            tracing::info!(user_id = %user_id, "User deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found("User"),
    }
}

/// `GET /api/settings`
pub async fn get_settings(State(state): State<AppState>) -> Json<serde_json::Map<String, serde_json::Value>> {
    let settings = state
        .settings
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();
    Json(settings)
}

/// `PUT /api/settings`
pub async fn update_settings(
    State(state): State<AppState>,
    Json(update): Json<serde_json::Map<String, serde_json::Value>>,
) -> Json<serde_json::Map<String, serde_json::Value>> {
    for (key, value) in update {
        state.settings.insert(key, value);
    }
    get_settings(State(state)).await
}

/// `POST /api/nginx/certificates`
pub async fn create_certificate(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CertificateRequest>,
) -> Response {
    let Some(user) = caller.user() else {
        return no_caller();
    };
    if req.domain_names.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "At least one domain name is required", Some("validation"));
    }

    let certificate = Certificate {
        id: uuid::Uuid::new_v4().to_string(),
        nice_name: req.nice_name,
        domain_names: req.domain_names,
        owner_id: user.id().to_string(),
        created_on: chrono::Utc::now().to_rfc3339(),
    };
    state.certificates.insert(certificate.id.clone(), certificate.clone());
    tracing::info!(certificate_id = %certificate.id, owner = %certificate.owner_id, "Certificate created");
    (StatusCode::CREATED, Json(certificate)).into_response()
}

/// `GET /api/nginx/proxy-hosts`
///
/// Anonymous callers see domain names only.
pub async fn list_proxy_hosts(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> Response {
    let mut hosts: Vec<ProxyHost> = state.proxy_hosts.iter().map(|h| h.value().clone()).collect();
    hosts.sort_by_key(|h| h.id);

    match caller {
        Caller::User(_) => Json(hosts).into_response(),
        Caller::Anonymous => {
            let reduced: Vec<serde_json::Value> = hosts
                .into_iter()
                .map(|h| serde_json::json!({ "id": h.id, "domain_names": h.domain_names }))
                .collect();
            Json(reduced).into_response()
        }
    }
}

/// `GET /api/nginx/access-lists/{list_id}`
pub async fn get_access_list(State(state): State<AppState>, Path(list_id): Path<i64>) -> Response {
    match state.directory.fetch_access_list(list_id).await {
        Ok(Some(list)) => Json(list).into_response(),
        Ok(None) => not_found("Access list"),
        Err(e) => unavailable(e),
    }
}
