//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (trusted origins, preflight short-circuit)
//!     → rate_limit.rs (per-IP token buckets)
//!     → Pass to application
//! ```
//!
//! # Design Decisions
//! - Exact origin matching, no wildcards
//! - Rate limit state is an owned registry, swept on the server's schedule
//! - No trust in client input

pub mod cors;
pub mod rate_limit;

pub use cors::OriginGuard;
pub use rate_limit::{ClientRegistry, RateLimiter};
