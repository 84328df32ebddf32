//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use proxy_console::admission::{AdmissionPipeline, Collaborators};
use proxy_console::config::ConsoleConfig;
use proxy_console::directory::{BcryptVerifier, DirectoryError, IdentityDirectory, MemoryDirectory, UserRecord};
use proxy_console::http::{AppState, HttpServer};
use proxy_console::security::clock::ManualClock;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const ADMIN_ID: &str = "1";

/// A router wired to an in-memory directory and a manual clock.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub directory: MemoryDirectory,
    pub clock: ManualClock,
}

impl TestApp {
    pub fn pipeline(&self) -> &Arc<AdmissionPipeline> {
        &self.state.pipeline
    }

    /// Sign a token for `subject` carrying `roles`.
    pub fn token(&self, subject: &str, roles: &[&str]) -> String {
        let roles: BTreeSet<String> = roles.iter().map(|r| r.to_string()).collect();
        let (token, _) = self
            .pipeline()
            .validator()
            .issue(subject, &format!("{}@example.com", subject), &roles)
            .unwrap();
        token
    }

    pub fn admin_token(&self) -> String {
        self.token(ADMIN_ID, &["admin"])
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        send(&self.router, request).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    TestResponse { status, headers, body }
}

/// Default config with a valid secret.
pub fn config() -> ConsoleConfig {
    let mut config = ConsoleConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config.auth.bcrypt_cost = 4;
    config
}

pub fn user(id: &str, roles: &[&str]) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        name: format!("User {}", id),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        disabled: false,
        password_hash: String::new(),
    }
}

/// Admin `1`, plain users `42` and `7`.
pub fn seeded_directory() -> MemoryDirectory {
    let directory = MemoryDirectory::new(Arc::new(BcryptVerifier));
    directory.upsert_user(user(ADMIN_ID, &["admin"]));
    directory.upsert_user(user("42", &[]));
    directory.upsert_user(user("7", &[]));
    directory
}

pub fn build(config: ConsoleConfig) -> TestApp {
    let directory = seeded_directory();
    build_with(config, directory.clone(), Arc::new(directory))
}

/// Build with a separate identity collaborator, e.g. one that fails.
pub fn build_with(config: ConsoleConfig, directory: MemoryDirectory, identity: Arc<dyn IdentityDirectory>) -> TestApp {
    for list in &config.access_control.access_lists {
        directory.put_access_list(list.clone());
    }

    let clock = ManualClock::default();
    let collaborators = Collaborators {
        directory: identity,
        access_lists: Arc::new(directory.clone()),
        verifier: Arc::new(BcryptVerifier),
    };
    let pipeline = Arc::new(AdmissionPipeline::new(&config, collaborators, Arc::new(clock.clone())));
    let state = AppState::with_pipeline(pipeline, directory.clone());
    let router = HttpServer::build_router(&config, state.clone());

    TestApp {
        router,
        state,
        directory,
        clock,
    }
}

pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

pub fn get(uri: &str) -> Request<Body> {
    request(Method::GET, uri).body(Body::empty()).unwrap()
}

pub fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    request(Method::GET, uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: Method, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = request(method, uri).header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Identity collaborator that is always down.
#[derive(Debug)]
pub struct FailingDirectory;

#[async_trait]
impl IdentityDirectory for FailingDirectory {
    async fn lookup_user_roles(&self, _: &str) -> Result<Option<BTreeSet<String>>, DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".into()))
    }

    async fn lookup_permission(&self, _: &str, _: &str) -> Result<bool, DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".into()))
    }

    async fn find_user(&self, _: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".into()))
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".into()))
    }

    async fn authenticate(&self, _: &str, _: &str) -> Result<Option<UserRecord>, DirectoryError> {
        Err(DirectoryError::Unavailable("connection refused".into()))
    }
}
