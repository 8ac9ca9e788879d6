//! Per-client rate limiting middleware.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

/// A single client's credit balance.
#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A fresh bucket that has already admitted the current request.
    fn admitted(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity - 1.0,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_refill = now;

        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }
}

/// Token bucket limiter keyed by client.
///
/// Buckets live in a sharded map; the entry guard makes refill, decision and
/// write atomic for one key while unrelated keys proceed in parallel.
pub struct TokenBucketLimiter {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucketLimiter {
    pub fn new(refill_rate: f64, capacity: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity: capacity as f64,
            refill_rate,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }

    /// Admit or deny one request from `key`.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();

        if let Some(mut bucket) = self.buckets.get_mut(key) {
            return bucket.try_acquire(self.capacity, self.refill_rate, now);
        }

        let mut admitted = true;
        self.buckets
            .entry(key.to_string())
            // Another request for the same key may have created it meanwhile.
            .and_modify(|bucket| {
                admitted = bucket.try_acquire(self.capacity, self.refill_rate, now);
            })
            .or_insert_with(|| TokenBucket::admitted(self.capacity, now));
        admitted
    }

    /// Current balance for `key`, without refilling.
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.buckets.get(key).map(|b| b.tokens)
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop buckets not touched for `ttl`. Returns how many were removed.
    ///
    /// An evicted client starts again with a full bucket, which is what an
    /// idle bucket would have refilled to anyway.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < ttl);
        before.saturating_sub(self.buckets.len())
    }

    /// Periodically evict idle buckets until shutdown.
    pub async fn run_sweeper(
        self: Arc<Self>,
        ttl: Duration,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(ttl_secs = ttl.as_secs(), "Rate limiter idle sweep starting");

        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_idle(ttl);
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Evicted idle rate limit buckets");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limiter sweep stopping");
                    break;
                }
            }
        }
    }
}

/// Derive the client key: first `X-Forwarded-For` hop, else the peer IP.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(hop), _) => hop.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Middleware rejecting clients that exhausted their bucket.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<TokenBucketLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_key(request.headers(), peer);

    if limiter.allow(&key) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        GatewayError::RateLimited.into_response()
    }
}
