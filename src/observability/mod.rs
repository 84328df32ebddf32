//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Admission pipeline, guard and limiters produce:
//!     → logging.rs (structured log events, request id on every span)
//!     → metrics.rs (admission counters, visitor gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Denial reasons are logged and counted but never returned to 403 callers
//! - Directory degradation has its own series, separate from denials

pub mod logging;
pub mod metrics;
