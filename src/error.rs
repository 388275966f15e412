//! Lifecycle-level errors.
//!
//! Per-request failures never reach this type; they are turned into
//! responses inside the pipeline (see [`crate::http::response::ApiError`]).

use std::any::Any;
use std::time::Duration;

use thiserror::Error;

/// Errors that end [`crate::http::HttpServer::run`].
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound. Fatal at startup.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Termination signal handlers could not be registered.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    /// The listener socket failed.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// In-flight requests did not finish within the drain window.
    #[error("in-flight requests still running after {0:?}")]
    DrainTimeout(Duration),

    /// The serving task itself panicked or was cancelled.
    #[error("serving task failed: {0}")]
    Task(String),
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_handles_common_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(format!("code {}", 7));
        assert_eq!(panic_message(payload.as_ref()), "code 7");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
