//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, owns every connection task)
//!     → connection.rs (HTTP/1 + HTTP/2 over hyper, per-connection drain)
//!     → Hand off to the wrapped application router
//! ```
//!
//! # Design Decisions
//! - Connection tasks live in a `JoinSet` owned by the accept loop; dropping
//!   the loop aborts every connection still open
//! - Each connection closes gracefully once shutdown is triggered

pub mod connection;
pub mod listener;

pub use listener::serve_connections;
