//! Guarded HTTP server (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                    HttpServer                        │
//!   Client Request     │  ┌─────────┐   ┌───────┐   ┌──────┐   ┌───────────┐  │
//!   ───────────────────┼─▶│ traffic │──▶│ panic │──▶│ cors │──▶│ rate limit│──┼──▶ application
//!                      │  │  meter  │   │ guard │   │      │   │           │  │     router
//!                      │  └─────────┘   └───────┘   └──────┘   └───────────┘  │
//!                      │                                                      │
//!                      │  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐ │
//!                      │  │  lifecycle   │  │  background  │  │ /debug/vars │ │
//!                      │  │ signals/state│  │    tasks     │  │  metrics    │ │
//!                      │  └──────────────┘  └──────────────┘  └─────────────┘ │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use clap::Parser;
use serde_json::json;

use guarded_server::config::Cli;
use guarded_server::observability::{logging, metrics};
use guarded_server::{HttpServer, ShutdownOutcome};

#[derive(Clone)]
struct AppInfo {
    env: String,
}

async fn home() -> impl IntoResponse {
    Json(json!({ "message": "service is running" }))
}

async fn healthcheck(State(info): State<AppInfo>) -> impl IntoResponse {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": info.env,
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "the requested resource could not be found" })),
    )
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::from(2);
        }
    };

    logging::init(&config.observability);
    tracing::info!(
        port = config.port,
        env = %config.env,
        rate_limit_enabled = config.limiter.enabled,
        rate_limit_rps = config.limiter.requests_per_second,
        rate_limit_burst = config.limiter.burst,
        trusted_origins = ?config.cors.trusted_origins,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = Router::new()
        .route("/", get(home))
        .route("/healthcheck", get(healthcheck))
        .fallback(not_found)
        .with_state(AppInfo {
            env: config.env.clone(),
        });

    let server = HttpServer::new(config);
    match server.serve(app).await {
        Ok(ShutdownOutcome::Graceful) => ExitCode::SUCCESS,
        Ok(ShutdownOutcome::Forced { abandoned_tasks }) => {
            tracing::warn!(abandoned_tasks, "Forced shutdown");
            ExitCode::from(3)
        }
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
