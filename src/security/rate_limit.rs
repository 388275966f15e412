//! Per-client rate limiting with token buckets.
//!
//! Each client identity (its IP address) owns a bucket holding up to `burst`
//! tokens that refills continuously at `requests_per_second`. Every request
//! spends one token; a request that finds less than one token is rejected
//! with 429.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::config::LimiterConfig;
use crate::http::response::ApiError;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// A simple token bucket rate limiter.
#[derive(Debug, Clone)]
struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Rate limiter state for one client identity.
#[derive(Debug, Clone)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// All known clients behind a single mutex.
///
/// Hold time is constant per request and linear in the number of clients for
/// a sweep.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ClientEntry>>,
    requests_per_second: f64,
    burst: f64,
}

impl ClientRegistry {
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            requests_per_second,
            burst: f64::from(burst),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        // The map holds no invariants a panicking holder could break halfway.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spend a token for `identity` at `now`. Unknown identities start full.
    ///
    /// `last_seen` moves forward whether or not the request is admitted.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let mut clients = self.lock();
        if let Some(entry) = clients.get_mut(identity) {
            entry.last_seen = now;
            return entry.bucket.try_acquire(now);
        }

        let mut entry = ClientEntry {
            bucket: TokenBucket::full(self.burst, self.requests_per_second, now),
            last_seen: now,
        };
        let allowed = entry.bucket.try_acquire(now);
        clients.insert(identity.to_owned(), entry);
        allowed
    }

    /// Drop every client idle for longer than `max_idle` as of `now`.
    ///
    /// Returns how many were removed.
    pub fn sweep(&self, now: Instant, max_idle: Duration) -> usize {
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= max_idle);
        let removed = before - clients.len();
        metrics::record_clients_tracked(clients.len());
        removed
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.lock().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Admission control for the whole server.
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    registry: ClientRegistry,
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        let registry = ClientRegistry::new(config.requests_per_second, config.burst);
        Self { config, registry }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Admission decision for `identity` right now.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    /// Admission decision for `identity` at `now`.
    ///
    /// Always `true` when disabled, without touching the registry.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        if !self.config.enabled {
            return true;
        }
        self.registry.allow_at(identity, now)
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Start the periodic eviction sweep. It ends when `shutdown` fires.
    ///
    /// Returns `None` when the limiter is disabled, since the registry then
    /// stays empty.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: ShutdownSignal) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            return None;
        }

        let limiter = Arc::clone(self);
        let period = self.config.sweep_interval();
        let max_idle = self.config.idle_eviction();

        Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.registry.sweep(Instant::now(), max_idle);
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                remaining = limiter.registry.len(),
                                "Evicted idle rate limit clients"
                            );
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limit sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        }))
    }
}

/// Identity used to bucket a request: the peer IP address.
pub fn client_identity(request: &Request) -> Result<String, ApiError> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or(ApiError::IdentityUnavailable)
}

/// Middleware function for per-client rate limiting.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let identity = match client_identity(&request) {
        Ok(identity) => identity,
        Err(e) => {
            tracing::error!(
                method = %request.method(),
                uri = %request.uri(),
                error = %e,
                "Cannot determine client identity"
            );
            return e.into_response();
        }
    };

    if limiter.allow(&identity) {
        next.run(request).await
    } else {
        tracing::warn!(client = %identity, "Rate limit exceeded");
        metrics::record_rate_limited();
        ApiError::RateLimitExceeded.into_response()
    }
}
