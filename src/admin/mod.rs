//! Operator endpoints.
//!
//! The caller installs the admin guard with `route_layer`; nothing here
//! checks roles itself.

pub mod handlers;

use axum::{routing::get, Router};

use self::handlers::*;
use crate::http::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/limiter", get(get_limiter))
}
