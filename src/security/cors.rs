//! Cross-origin request policy.
//!
//! Only exact, case-sensitive matches against the trusted list are allowed.
//! Anything else passes through without CORS grants and the browser enforces
//! the denial.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
        },
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::Response,
};

use crate::config::CorsConfig;

pub const ALLOWED_METHODS: &str = "OPTIONS, PUT, PATCH, DELETE";
pub const ALLOWED_HEADERS: &str = "Authorization, Content-Type";

/// What to do with one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsDecision {
    /// No trusted origin: forward untouched.
    PassThrough,
    /// Trusted origin: forward and grant access to this origin.
    Allow(HeaderValue),
    /// Trusted preflight: answer here, never forward.
    Preflight(HeaderValue),
}

/// Trusted-origin policy.
#[derive(Debug, Clone, Default)]
pub struct OriginGuard {
    trusted_origins: Vec<String>,
}

impl OriginGuard {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            trusted_origins: config.trusted_origins.clone(),
        }
    }

    pub fn is_trusted(&self, origin: &str) -> bool {
        self.trusted_origins.iter().any(|trusted| trusted == origin)
    }

    pub fn evaluate(&self, method: &Method, headers: &HeaderMap) -> CorsDecision {
        if self.trusted_origins.is_empty() {
            return CorsDecision::PassThrough;
        }

        let Some(origin) = headers.get(ORIGIN) else {
            return CorsDecision::PassThrough;
        };
        let trusted = origin
            .to_str()
            .map(|origin| !origin.is_empty() && self.is_trusted(origin))
            .unwrap_or(false);
        if !trusted {
            return CorsDecision::PassThrough;
        }

        if method == Method::OPTIONS && headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD) {
            CorsDecision::Preflight(origin.clone())
        } else {
            CorsDecision::Allow(origin.clone())
        }
    }
}

fn append_vary(headers: &mut HeaderMap) {
    headers.append(VARY, HeaderValue::from_static("Origin"));
    headers.append(VARY, HeaderValue::from_static("Access-Control-Request-Method"));
}

/// Middleware applying [`OriginGuard`] to every request.
pub async fn origin_guard(
    State(guard): State<Arc<OriginGuard>>,
    request: Request,
    next: Next,
) -> Response {
    match guard.evaluate(request.method(), request.headers()) {
        CorsDecision::Preflight(origin) => {
            tracing::debug!(origin = ?origin, "Answering CORS preflight");
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::OK;
            let headers = response.headers_mut();
            append_vary(headers);
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            headers.insert(
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            headers.insert(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOWED_HEADERS),
            );
            response
        }
        CorsDecision::Allow(origin) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            append_vary(headers);
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            response
        }
        CorsDecision::PassThrough => {
            let mut response = next.run(request).await;
            append_vary(response.headers_mut());
            response
        }
    }
}
