//! Accept loop.
//!
//! # Responsibilities
//! - Accept incoming TCP connections until shutdown
//! - Spawn and own one task per connection
//! - Wait for open connections to drain once the listener is closed
//!
//! Dropping the future returned by [`serve_connections`] (for instance by
//! aborting the task running it) aborts every connection task it owns.

use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::lifecycle::Shutdown;
use crate::net::connection::serve_connection;

/// Pause after a failed accept, typically fd exhaustion.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serve `app` on `listener` until `shutdown` fires, then close the listener
/// and wait for every open connection to finish.
pub async fn serve_connections(listener: TcpListener, app: Router, shutdown: Shutdown) {
    let mut connections = JoinSet::new();
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(
                        stream,
                        peer,
                        app.clone(),
                        shutdown.subscribe(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = stop.recv() => break,
        }
    }

    drop(listener);
    tracing::debug!(open = connections.len(), "Listener closed, draining connections");
    while connections.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn get_raw(addr: std::net::SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        // An aborted connection may surface as a reset.
        let _ = stream.read_to_string(&mut response).await;
        response
    }

    #[tokio::test]
    async fn serves_until_shutdown_then_closes_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let app = Router::new().route("/", get(|| async { "hello" }));

        let task = tokio::spawn(serve_connections(listener, app, shutdown.clone()));

        let response = get_raw(addr).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("hello"));

        shutdown.trigger();
        task.await.unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn aborting_the_loop_aborts_open_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let app = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );

        let task = tokio::spawn(serve_connections(listener, app, shutdown.clone()));
        let client = tokio::spawn(get_raw(addr));
        tokio::time::sleep(Duration::from_millis(100)).await;

        task.abort();
        let _ = task.await;

        // The connection is reset instead of waiting 30 seconds for a reply.
        let response = tokio::time::timeout(Duration::from_secs(5), client)
            .await
            .unwrap()
            .unwrap();
        assert!(response.is_empty());
    }
}
