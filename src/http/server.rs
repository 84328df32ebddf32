//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with every console route
//! - Attach each route group's access requirement
//! - Wire up middleware (request ID, tracing, timeout, admission)
//! - Bind server to listener and shut down gracefully

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::{middleware, Router};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admission::{self, AdmissionPipeline, Collaborators, RouteGuard};
use crate::auth::guard::Requirement;
use crate::config::ConsoleConfig;
use crate::directory::MemoryDirectory;
use crate::http::handlers::{self, Certificate, ProxyHost};
use crate::security::clock::SystemClock;

/// Permission required to upload certificates.
pub const CERTIFICATES_MANAGE: &str = "certificates.manage";

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<AdmissionPipeline>,
    pub directory: MemoryDirectory,
    pub settings: Arc<DashMap<String, serde_json::Value>>,
    pub certificates: Arc<DashMap<String, Certificate>>,
    pub proxy_hosts: Arc<DashMap<i64, ProxyHost>>,
    pub started_at: Instant,
}

impl AppState {
    /// State whose pipeline consults `directory` for every collaborator.
    pub fn new(config: &ConsoleConfig, directory: MemoryDirectory) -> Self {
        let collaborators = Collaborators {
            directory: Arc::new(directory.clone()),
            access_lists: Arc::new(directory.clone()),
            verifier: Arc::new(crate::directory::BcryptVerifier),
        };
        let pipeline = AdmissionPipeline::new(config, collaborators, Arc::new(SystemClock));
        Self::with_pipeline(Arc::new(pipeline), directory)
    }

    pub fn with_pipeline(pipeline: Arc<AdmissionPipeline>, directory: MemoryDirectory) -> Self {
        Self {
            pipeline,
            directory,
            settings: Arc::new(DashMap::new()),
            certificates: Arc::new(DashMap::new()),
            proxy_hosts: Arc::new(DashMap::new()),
            started_at: Instant::now(),
        }
    }
}

/// HTTP server for the console.
pub struct HttpServer {
    router: Router,
    config: ConsoleConfig,
}

impl HttpServer {
    pub fn new(config: ConsoleConfig, state: AppState) -> Self {
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers listed last run first: a request id is assigned, then the
    /// request is traced, timed and admitted before routing.
    #[allow(deprecated)]
    pub fn build_router(config: &ConsoleConfig, state: AppState) -> Router {
        let pipeline = state.pipeline.clone();
        let guarded = |requirement: Requirement| RouteGuard::new(pipeline.clone(), requirement);

        let public = Router::new()
            .route("/health", get(handlers::health))
            .route("/api/tokens", post(handlers::login));

        let optional = Router::new()
            .route("/api/nginx/proxy-hosts", get(handlers::list_proxy_hosts))
            .route_layer(middleware::from_fn_with_state(
                guarded(Requirement::Optional),
                admission::guard,
            ));

        let authenticated = Router::new()
            .route("/api/tokens/refresh", get(handlers::refresh))
            .route("/api/users/me", get(handlers::current_user))
            .route("/api/nginx/access-lists/{list_id}", get(handlers::get_access_list))
            .route_layer(middleware::from_fn_with_state(
                guarded(Requirement::Authenticated),
                admission::guard,
            ));

        let admin = Router::new()
            .route("/api/users", get(handlers::list_users))
            .route("/api/settings", get(handlers::get_settings).put(handlers::update_settings))
            .route_layer(middleware::from_fn_with_state(
                guarded(Requirement::Admin),
                admission::guard,
            ));

        let owner = Router::new()
            .route(
                "/api/users/{user_id}",
                get(handlers::get_user)
                    .put(handlers::update_user)
                    .delete(handlers::delete_user),
            )
            .route_layer(middleware::from_fn_with_state(
                guarded(Requirement::owner("user_id")),
                admission::guard,
            ));

        let certificates = Router::new()
            .route("/api/nginx/certificates", post(handlers::create_certificate))
            .route_layer(middleware::from_fn_with_state(
                guarded(Requirement::permission(CERTIFICATES_MANAGE)),
                admission::guard,
            ));

        let console_admin = crate::admin::router().route_layer(middleware::from_fn_with_state(
            guarded(Requirement::Admin),
            admission::guard,
        ));

        Router::new()
            .merge(public)
            .merge(optional)
            .merge(authenticated)
            .merge(admin)
            .merge(owner)
            .merge(certificates)
            .merge(console_admin)
            .with_state(state)
            .layer(middleware::from_fn_with_state(pipeline.clone(), admission::admission))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// A clone of the assembled router, for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }
}
