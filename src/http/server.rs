//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Wrap the application router in the request pipeline
//! - Bind server to listener and hand it to the accept loop in `crate::net`
//! - Drive the state machine Starting → Serving → ShuttingDown → Stopped
//! - Drain in-flight requests and background tasks on shutdown
//!
//! # Pipeline
//! ```text
//! request-id → trace → TrafficMeter → PanicGuard → OriginGuard → RateLimiter → timeout → app
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, Router};
use tokio::net::TcpListener;
use tokio::time;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::{handlers::VarsState, setup_debug_router};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::middleware::PanicGuard;
use crate::lifecycle::state::StateCell;
use crate::lifecycle::signals::TerminationSignals;
use crate::lifecycle::{
    startup, BackgroundTasks, ServerHandle, ServerState, Shutdown, ShutdownOutcome,
};
use crate::net::serve_connections;
use crate::observability::traffic::{track_traffic, TrafficMeter};
use crate::security::cors::{origin_guard, OriginGuard};
use crate::security::rate_limit::{rate_limit, RateLimiter};

/// HTTP server owning the pipeline components and the lifecycle.
pub struct HttpServer {
    config: ServerConfig,
    limiter: Arc<RateLimiter>,
    origins: Arc<OriginGuard>,
    meter: Arc<TrafficMeter>,
    background: BackgroundTasks,
    shutdown: Shutdown,
    state: StateCell,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.limiter.clone()));
        let origins = Arc::new(OriginGuard::new(&config.cors));

        Self {
            config,
            limiter,
            origins,
            meter: Arc::new(TrafficMeter::new()),
            background: BackgroundTasks::new(),
            shutdown: Shutdown::new(),
            state: StateCell::new(),
        }
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Launcher for work that must finish before the process exits.
    pub fn background(&self) -> BackgroundTasks {
        self.background.clone()
    }

    pub fn meter(&self) -> Arc<TrafficMeter> {
        Arc::clone(&self.meter)
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Control handle: observe the state or request a stop.
    pub fn handle(&self) -> ServerHandle {
        self.state.handle(self.shutdown.clone())
    }

    /// Wrap `app` in the full request pipeline.
    pub fn wrap(&self, app: Router) -> Router {
        let app = if self.config.observability.expose_vars {
            app.merge(setup_debug_router(VarsState {
                meter: self.meter(),
                background: self.background(),
            }))
        } else {
            app
        };

        app.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(middleware::from_fn_with_state(self.meter(), track_traffic))
                .layer(PanicGuard::layer())
                .layer(middleware::from_fn_with_state(
                    Arc::clone(&self.origins),
                    origin_guard,
                ))
                .layer(middleware::from_fn_with_state(self.limiter(), rate_limit))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(self.config.timeouts.request_secs),
                )),
        )
    }

    /// Bind the configured port, stop on SIGINT/SIGTERM, and serve `app`
    /// until shutdown completes.
    pub async fn serve(self, app: Router) -> Result<ShutdownOutcome, ServerError> {
        let mut signals = TerminationSignals::install().map_err(ServerError::Signals)?;
        let listener = startup::bind_listener(&self.config).await?;

        let handle = self.handle();
        let signal_listener = tokio::spawn(async move {
            loop {
                let signal = signals.recv().await;
                if handle.stop() {
                    tracing::info!(signal, "Shutting down server");
                } else {
                    tracing::info!(signal, state = %handle.state(), "Signal ignored");
                }
            }
        });

        let result = self.run(listener, app).await;
        signal_listener.abort();
        result
    }

    /// Serve `app` on an already bound listener until shutdown completes.
    pub async fn run(self, listener: TcpListener, app: Router) -> Result<ShutdownOutcome, ServerError> {
        let address = listener.local_addr().map_err(ServerError::Serve)?;
        let app = self.wrap(app);

        let sweeper = self.limiter.spawn_sweeper(self.shutdown.subscribe());

        // Owns every connection task; aborting it aborts them all.
        let mut serving = tokio::spawn(serve_connections(listener, app, self.shutdown.clone()));

        self.state.set(ServerState::Serving);
        tracing::info!(
            address = %address,
            env = %self.config.env,
            rate_limit = self.limiter.is_enabled(),
            "Server started"
        );

        let mut first_error = None;
        let mut stop = self.shutdown.subscribe();
        let accept_loop_ended = tokio::select! {
            joined = &mut serving => {
                // The accept loop only ends on its own if it panicked.
                tracing::error!("Accept loop ended without a shutdown request");
                first_error = Some(match joined {
                    Err(e) => ServerError::Task(e.to_string()),
                    Ok(()) => ServerError::Task("accept loop ended unexpectedly".to_string()),
                });
                true
            }
            _ = stop.recv() => false,
        };

        self.state.set(ServerState::ShuttingDown);
        // Already set on the signal path; on the failure path this stops the sweeper.
        self.shutdown.trigger();

        if !accept_loop_ended {
            let drain_timeout = self.config.shutdown.drain_timeout();
            tracing::info!(
                in_flight = self.meter.in_flight(),
                timeout = ?drain_timeout,
                "Draining in-flight requests"
            );
            match time::timeout(drain_timeout, &mut serving).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(ServerError::Task(e.to_string()));
                }
                Err(_) => {
                    tracing::warn!(
                        timeout = ?drain_timeout,
                        in_flight = self.meter.in_flight(),
                        "Drain timed out, aborting remaining connections"
                    );
                    serving.abort();
                    // Cancelled once the connection set has been dropped.
                    let _ = serving.await;
                    first_error.get_or_insert(ServerError::DrainTimeout(drain_timeout));
                }
            }
        }

        tracing::info!(
            outstanding = self.background.outstanding(),
            "Completing background tasks"
        );
        let outcome = match self
            .background
            .drain(self.config.shutdown.background_timeout())
            .await
        {
            Ok(()) => ShutdownOutcome::Graceful,
            Err(abandoned_tasks) => {
                tracing::warn!(abandoned_tasks, "Background tasks did not finish in time");
                ShutdownOutcome::Forced { abandoned_tasks }
            }
        };

        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }

        self.state.set(ServerState::Stopped);

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!(address = %address, outcome = ?outcome, "Server stopped");
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use axum::{
        body::Body,
        extract::{ConnectInfo, Request},
        http::{header, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    async fn boom() -> &'static str {
        panic!("downstream failure")
    }

    fn request(uri: &str) -> Request {
        let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let peer: SocketAddr = "198.51.100.4:40000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        req
    }

    fn server(burst: u32) -> HttpServer {
        let mut config = ServerConfig::default();
        config.limiter.burst = burst;
        config.limiter.requests_per_second = 0.001;
        config.cors.trusted_origins = vec!["https://app.example.com".into()];
        HttpServer::new(config)
    }

    #[tokio::test]
    async fn pipeline_meters_rate_limited_and_panicking_requests() {
        let server = server(2);
        let app = server.wrap(
            Router::new()
                .route("/", get(|| async { "home" }))
                .route("/boom", get(boom)),
        );

        let ok = app.clone().oneshot(request("/")).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(ok.headers().contains_key("x-request-id"));

        let failed = app.clone().oneshot(request("/boom")).await.unwrap();
        assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(failed.headers()[header::CONNECTION], "close");

        let limited = app.oneshot(request("/")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        // CORS sits outside the limiter, so even a 429 varies on origin.
        assert_eq!(limited.headers().get_all(header::VARY).iter().count(), 2);

        let meter = server.meter();
        assert_eq!(meter.total_requests(), 3);
        assert_eq!(meter.total_responses(), 3);
        assert_eq!(meter.responses_with_status(StatusCode::OK), 1);
        assert_eq!(meter.responses_with_status(StatusCode::INTERNAL_SERVER_ERROR), 1);
        assert_eq!(meter.responses_with_status(StatusCode::TOO_MANY_REQUESTS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_gets_408() {
        let mut config = ServerConfig::default();
        config.timeouts.request_secs = 1;
        let server = HttpServer::new(config);
        let app = server.wrap(Router::new().route(
            "/slow",
            get(|| async {
                time::sleep(Duration::from_secs(60)).await;
                "late"
            }),
        ));

        let response = app.oneshot(request("/slow")).await.unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(server.meter().responses_with_status(StatusCode::REQUEST_TIMEOUT), 1);
    }

    #[tokio::test]
    async fn vars_route_is_merged_when_enabled() {
        let server = server(10);
        let app = server.wrap(Router::new());
        let response = app.oneshot(request("/debug/vars")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut config = ServerConfig::default();
        config.observability.expose_vars = false;
        let hidden = HttpServer::new(config).wrap(Router::new());
        let response = hidden.oneshot(request("/debug/vars")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn run_reaches_stopped_after_stop() {
        let server = server(10);
        let handle = server.handle();
        assert_eq!(handle.state(), ServerState::Starting);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let task = tokio::spawn(server.run(listener, Router::new()));

        assert_eq!(handle.wait_for(ServerState::Serving).await, ServerState::Serving);
        assert!(handle.stop());
        assert!(!handle.stop());

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, ShutdownOutcome::Graceful);
        assert_eq!(handle.state(), ServerState::Stopped);
        assert!(!handle.stop());
    }
}
