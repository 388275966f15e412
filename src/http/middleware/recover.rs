//! Panic recovery for the request pipeline.
//!
//! Plugged into `tower_http::catch_panic::CatchPanicLayer`, which catches a
//! panic raised while polling anything below it and asks [`PanicGuard`] for
//! the single response to send instead.

use std::any::Any;

use axum::{
    body::Body,
    http::{header::CONNECTION, HeaderValue, Response},
    response::IntoResponse,
};
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};

use crate::error::panic_message;
use crate::http::response::ApiError;
use crate::observability::metrics;

/// Turns a handler panic into a 500 and closes the connection afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicGuard;

impl PanicGuard {
    pub fn layer() -> CatchPanicLayer<Self> {
        CatchPanicLayer::custom(Self)
    }
}

impl ResponseForPanic for PanicGuard {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Body> {
        let detail = panic_message(err.as_ref());
        tracing::error!(panic = %detail, "Request handler panicked");
        metrics::record_panic_recovered();

        let mut response = ApiError::Internal(detail).into_response();
        // The connection may be in an unknown state; do not reuse it.
        response
            .headers_mut()
            .insert(CONNECTION, HeaderValue::from_static("close"));
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Request, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route("/boom", get(boom))
            .layer(PanicGuard::layer())
    }

    #[tokio::test]
    async fn panic_becomes_single_500_with_close() {
        let response = app()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONNECTION], "close");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(value["error"].is_string());
        assert!(!value["error"].as_str().unwrap().contains("exploded"));
    }

    #[tokio::test]
    async fn router_keeps_serving_after_panic() {
        let app = app();
        let _ = app
            .clone()
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let response = app
            .oneshot(Request::builder().uri("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(CONNECTION).is_none());
    }
}
