//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request pipeline produces:
//!     → traffic.rs (request/response counters, latency, status tallies)
//!     → metrics.rs (mirror into the metrics facade / Prometheus)
//!     → logging.rs (structured log events)
//!
//! Consumers:
//!     → /debug/vars (JSON snapshot, see crate::admin)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Log aggregation (stdout)
//! ```

pub mod logging;
pub mod metrics;
pub mod traffic;

pub use traffic::{TrafficMeter, TrafficSnapshot};
