//! Shared utilities for integration testing.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use guarded_server::{
    BackgroundTasks, HttpServer, ServerConfig, ServerError, ServerHandle, ServerState,
    ShutdownOutcome,
};

/// A server running on an ephemeral loopback port.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub background: BackgroundTasks,
    pub task: JoinHandle<Result<ShutdownOutcome, ServerError>>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Request a stop and wait for the server to finish shutting down.
    pub async fn stop(self) -> Result<ShutdownOutcome, ServerError> {
        assert!(self.handle.stop(), "server was not serving");
        self.task.await.expect("server task panicked")
    }
}

/// Config tuned for tests: generous rate limit unless a test narrows it.
#[allow(dead_code)]
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.port = 0;
    config.limiter.requests_per_second = 100.0;
    config.limiter.burst = 100;
    config.shutdown.drain_timeout_secs = 5;
    config
}

/// Start a server whose router is built with access to its background task
/// launcher, and wait until it is serving.
pub async fn start_server<F>(config: ServerConfig, build: F) -> TestServer
where
    F: FnOnce(BackgroundTasks) -> Router,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = HttpServer::new(config);
    let handle = server.handle();
    let background = server.background();
    let app = build(background.clone());

    let task = tokio::spawn(server.run(listener, app));
    handle.wait_for(ServerState::Serving).await;

    TestServer {
        addr,
        handle,
        background,
        task,
    }
}
