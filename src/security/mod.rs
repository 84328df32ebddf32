//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client.rs (derive rate limit key and apparent address)
//!     → tiers.rs (pick general / auth / strict limiter)
//!     → rate_limit.rs (fixed-window token bucket per key)
//!     → access_list.rs (network gate, then credential gate)
//!     → Pass to authentication
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Limiter state is the only shared mutable state; one mutex per tier
//! - Access list evaluation is pure over a per-request snapshot

pub mod access_list;
pub mod client;
pub mod clock;
pub mod rate_limit;
pub mod tiers;
