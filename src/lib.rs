//! Request admission front-end for the nginx proxy console.

pub mod admin;
pub mod admission;
pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use admission::AdmissionPipeline;
pub use config::schema::ConsoleConfig;
pub use error::AdmissionError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
