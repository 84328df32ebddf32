//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (CONSOLE_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → ConsoleConfig (validated, immutable)
//!     → consumed once at startup to build the admission pipeline
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Environment overrides win over the file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AccessControlConfig, AccessListBinding, AuthConfig, BootstrapConfig, ConsoleConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, RateLimitConfig, TierLimits, TimeoutConfig,
};
