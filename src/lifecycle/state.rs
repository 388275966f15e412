//! Server state machine.
//!
//! # State Transitions
//! ```text
//! Starting → Serving: listener bound
//! Serving → ShuttingDown: termination signal or ServerHandle::stop
//! ShuttingDown → Stopped: listener closed, requests drained, tasks drained
//! ```
//!
//! The lifecycle in `http::server` is the only writer. Everyone else reads
//! through a [`ServerHandle`].

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::lifecycle::shutdown::Shutdown;

/// Lifecycle state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Starting => "starting",
            ServerState::Serving => "serving",
            ServerState::ShuttingDown => "shutting_down",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Owner side of the state channel.
pub(crate) struct StateCell {
    tx: Arc<watch::Sender<ServerState>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(ServerState::Starting);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn set(&self, next: ServerState) {
        let previous = self.tx.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Server state changed");
        }
    }

    pub(crate) fn handle(&self, shutdown: Shutdown) -> ServerHandle {
        ServerHandle {
            state: self.tx.subscribe(),
            shutdown,
        }
    }
}

/// Cloneable control handle for a running server.
#[derive(Clone)]
pub struct ServerHandle {
    state: watch::Receiver<ServerState>,
    shutdown: Shutdown,
}

impl ServerHandle {
    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Request a graceful shutdown.
    ///
    /// Only honored while serving; returns whether this call started the
    /// shutdown. Repeated calls and calls in any other state are no-ops.
    pub fn stop(&self) -> bool {
        if self.state() != ServerState::Serving {
            tracing::debug!(state = %self.state(), "Ignoring stop request");
            return false;
        }
        self.shutdown.trigger()
    }

    /// Wait until the server reaches `target` or any later state.
    pub async fn wait_for(&self, target: ServerState) -> ServerState {
        let mut rx = self.state.clone();
        let reached = match rx.wait_for(|state| *state >= target).await {
            Ok(state) => *state,
            // The server was dropped; it will never advance further.
            Err(_) => ServerState::Stopped,
        };
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered() {
        assert!(ServerState::Starting < ServerState::Serving);
        assert!(ServerState::Serving < ServerState::ShuttingDown);
        assert!(ServerState::ShuttingDown < ServerState::Stopped);
    }

    #[test]
    fn stop_only_while_serving() {
        let cell = StateCell::new();
        let shutdown = Shutdown::new();
        let handle = cell.handle(shutdown.clone());

        assert!(!handle.stop());
        assert!(!shutdown.is_triggered());

        cell.set(ServerState::Serving);
        assert!(handle.stop());
        assert!(!handle.stop());
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn wait_for_returns_later_states() {
        let cell = StateCell::new();
        let handle = cell.handle(Shutdown::new());
        cell.set(ServerState::Stopped);
        assert_eq!(handle.wait_for(ServerState::Serving).await, ServerState::Stopped);
    }
}
