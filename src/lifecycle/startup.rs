//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener before any traffic is accepted
//!
//! # Design Decisions
//! - Fail fast: a bind error is fatal and reported with the address

use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Bind the configured port on all interfaces.
pub async fn bind_listener(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;

    tracing::info!(address = %address, env = %config.env, "Listener bound");
    Ok(listener)
}
