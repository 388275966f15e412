//! Read-only operational endpoints polled by monitoring.

pub mod handlers;

use axum::{routing::get, Router};

use self::handlers::*;

pub const VARS_PATH: &str = "/debug/vars";

pub fn setup_debug_router(state: VarsState) -> Router {
    Router::new()
        .route(VARS_PATH, get(get_vars))
        .with_state(state)
}
