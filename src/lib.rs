//! Guarded HTTP serving core.
//!
//! Wraps an application router in a pipeline that meters traffic, recovers
//! from handler panics, applies a CORS policy and rate-limits each client,
//! then serves it with a graceful, bounded shutdown.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::ServerConfig;
pub use error::ServerError;
pub use http::HttpServer;
pub use lifecycle::{BackgroundTasks, ServerHandle, ServerState, Shutdown, ShutdownOutcome};
