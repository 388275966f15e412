//! Request/response traffic counters.
//!
//! Counters are monotonic for the life of the meter. Fields are updated
//! independently, so a snapshot taken under load may be off by the requests
//! in flight.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::observability::metrics;

/// Process traffic counters, owned by the server and shared by reference.
#[derive(Debug)]
pub struct TrafficMeter {
    started: Instant,
    total_requests: AtomicU64,
    total_responses: AtomicU64,
    total_processing_micros: AtomicU64,
    total_abandoned: AtomicU64,
    by_status: DashMap<u16, AtomicU64>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TrafficSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_us: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
    /// Requests dropped before a response was produced (client hung up,
    /// connection aborted).
    pub total_requests_abandoned: u64,
    pub uptime_secs: u64,
}

impl TrafficMeter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            total_responses: AtomicU64::new(0),
            total_processing_micros: AtomicU64::new(0),
            total_abandoned: AtomicU64::new(0),
            by_status: DashMap::new(),
        }
    }

    /// Count a request entering the pipeline.
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        metrics::record_request_received();
    }

    /// Count a response leaving the pipeline with its final status.
    pub fn record_response(&self, status: StatusCode, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_responses.fetch_add(1, Ordering::Relaxed);
        self.total_processing_micros
            .fetch_add(micros, Ordering::Relaxed);
        self.by_status
            .entry(status.as_u16())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
        metrics::record_response_sent(status.as_u16(), elapsed);
    }

    /// Count a request whose future was dropped before it produced a response.
    pub fn record_abandoned(&self) {
        self.total_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_responses(&self) -> u64 {
        self.total_responses.load(Ordering::Relaxed)
    }

    pub fn total_processing_micros(&self) -> u64 {
        self.total_processing_micros.load(Ordering::Relaxed)
    }

    pub fn total_abandoned(&self) -> u64 {
        self.total_abandoned.load(Ordering::Relaxed)
    }

    /// Requests counted in and neither answered nor abandoned yet.
    pub fn in_flight(&self) -> u64 {
        self.total_requests()
            .saturating_sub(self.total_responses())
            .saturating_sub(self.total_abandoned())
    }

    /// Responses sent with `status` so far.
    pub fn responses_with_status(&self, status: StatusCode) -> u64 {
        self.by_status
            .get(&status.as_u16())
            .map(|count| count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        let total_responses_sent_by_status = self
            .by_status
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().load(Ordering::Relaxed)))
            .collect();

        TrafficSnapshot {
            total_requests_received: self.total_requests(),
            total_responses_sent: self.total_responses(),
            total_processing_time_us: self.total_processing_micros(),
            total_responses_sent_by_status,
            total_requests_abandoned: self.total_abandoned(),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

impl Default for TrafficMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Outermost pipeline stage: counts and times every request.
///
/// Sits outside the panic guard, so the status it records is the one of the
/// response actually handed to the connection, including recovered panics.
pub async fn track_traffic(
    State(meter): State<Arc<TrafficMeter>>,
    request: Request,
    next: Next,
) -> Response {
    meter.record_request();
    let pending = PendingResponse {
        meter,
        start: Instant::now(),
        answered: false,
    };

    let response = next.run(request).await;

    pending.answer(response.status());
    response
}

/// Settles one counted request exactly once: as a response, or as abandoned
/// when the request future is dropped first.
struct PendingResponse {
    meter: Arc<TrafficMeter>,
    start: Instant,
    answered: bool,
}

impl PendingResponse {
    fn answer(mut self, status: StatusCode) {
        self.answered = true;
        self.meter.record_response(status, self.start.elapsed());
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if !self.answered {
            self.meter.record_abandoned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn counts_by_status() {
        let meter = TrafficMeter::new();
        meter.record_request();
        meter.record_request();
        meter.record_response(StatusCode::OK, Duration::from_micros(150));
        meter.record_response(StatusCode::TOO_MANY_REQUESTS, Duration::from_micros(50));

        assert_eq!(meter.total_requests(), 2);
        assert_eq!(meter.total_responses(), 2);
        assert_eq!(meter.total_processing_micros(), 200);
        assert_eq!(meter.responses_with_status(StatusCode::OK), 1);
        assert_eq!(meter.responses_with_status(StatusCode::TOO_MANY_REQUESTS), 1);
        assert_eq!(meter.responses_with_status(StatusCode::NOT_FOUND), 0);

        let snapshot = meter.snapshot();
        assert_eq!(snapshot.total_responses_sent_by_status.get("200"), Some(&1));
        assert_eq!(snapshot.total_responses_sent_by_status.get("429"), Some(&1));
    }

    #[tokio::test]
    async fn middleware_sees_handler_status() {
        let meter = Arc::new(TrafficMeter::new());
        let app = Router::new()
            .route("/teapot", get(|| async { StatusCode::IM_A_TEAPOT }))
            .layer(middleware::from_fn_with_state(meter.clone(), track_traffic));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/teapot").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

        let response = app
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        assert_eq!(meter.total_requests(), 2);
        assert_eq!(meter.total_responses(), 2);
        assert_eq!(meter.responses_with_status(StatusCode::IM_A_TEAPOT), 1);
        assert_eq!(meter.responses_with_status(StatusCode::NOT_FOUND), 1);
        assert_eq!(meter.total_abandoned(), 0);
    }

    #[tokio::test]
    async fn dropped_request_is_abandoned_not_in_flight() {
        let meter = Arc::new(TrafficMeter::new());
        let app = Router::new()
            .route("/hang", get(std::future::pending::<()>))
            .layer(middleware::from_fn_with_state(meter.clone(), track_traffic));

        let request = app.oneshot(Request::builder().uri("/hang").body(Body::empty()).unwrap());
        // The caller gives up, dropping the request future.
        let result = tokio::time::timeout(Duration::from_millis(20), request).await;
        assert!(result.is_err());

        assert_eq!(meter.total_requests(), 1);
        assert_eq!(meter.total_responses(), 0);
        assert_eq!(meter.total_abandoned(), 1);
        assert_eq!(meter.in_flight(), 0);
        assert_eq!(meter.snapshot().total_requests_abandoned, 1);
    }
}
