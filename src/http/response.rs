//! Error responses produced by the pipeline itself.
//!
//! Every error leaves the server as a JSON envelope `{"error": "<message>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures the pipeline answers on behalf of the handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The client spent its token bucket.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The peer address was not available to key the rate limiter.
    #[error("client address unavailable")]
    IdentityUnavailable,

    /// Anything else that is the server's fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::IdentityUnavailable | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown to the client. Server-side details stay in the logs.
    fn public_message(&self) -> &'static str {
        match self {
            ApiError::RateLimitExceeded => "rate limit exceeded",
            ApiError::IdentityUnavailable | ApiError::Internal(_) => {
                "the server encountered a problem and could not process your request"
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}
