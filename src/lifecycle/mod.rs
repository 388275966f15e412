//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Bind listener → Serving
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests → Drain background tasks → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Every drain stage has a timeout: forced exit after deadline
//! - Background work (background.rs) is tracked so shutdown can wait for it

pub mod background;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use background::BackgroundTasks;
pub use shutdown::{Shutdown, ShutdownOutcome, ShutdownSignal};
pub use state::{ServerHandle, ServerState};
