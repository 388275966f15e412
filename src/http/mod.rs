//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, pipeline assembly, lifecycle)
//!     → middleware/ (panic recovery)
//!     → security, observability stages
//!     → application router
//!     → response.rs (error envelopes produced by the pipeline)
//! ```

pub mod middleware;
pub mod response;
pub mod server;

pub use response::ApiError;
pub use server::HttpServer;
