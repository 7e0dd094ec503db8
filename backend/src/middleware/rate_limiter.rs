//! Per-client token bucket rate limiting

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use crate::error::ApiError;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_consume(&mut self, refill_per_second: f64, capacity: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_second).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared limiter state, keyed by client address
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, TokenBucket>>>,
    refill_per_second: f64,
    capacity: f64,
}

impl RateLimiter {
    /// `requests_per_second` sustained, bursts up to twice that
    pub fn new(requests_per_second: u32) -> Self {
        let rps = f64::from(requests_per_second.max(1));
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            refill_per_second: rps,
            capacity: rps * 2.0,
        }
    }

    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(self.capacity, now))
            .try_consume(self.refill_per_second, self.capacity, now)
    }

    /// Drop buckets idle for longer than `max_idle`
    pub async fn cleanup(&self, max_idle: Duration) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_update) < max_idle);
        let evicted = before - buckets.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted idle rate limit buckets");
        }
    }
}

/// `axum::middleware::from_fn_with_state` entry point
pub async fn rate_limit(State(limiter): State<RateLimiter>, request: Request, next: Next) -> Response {
    let client = client_key(&request);

    if !limiter.check(&client).await {
        tracing::warn!(client = %client, "Rate limit exceeded");
        let mut response = ApiError::TooManyRequests.into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, header::HeaderValue::from_static("1"));
        return response;
    }

    next.run(request).await
}

/// Forwarded address if behind a proxy, else the socket peer
fn client_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if let Some(ip) = forwarded {
        return ip;
    }

    if let Some(ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
    {
        return ip.trim().to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[tokio::test]
    async fn test_burst_then_deny() {
        let limiter = RateLimiter::new(5);

        for _ in 0..10 {
            assert!(limiter.check("10.0.0.1").await);
        }
        assert!(!limiter.check("10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_clients_have_separate_buckets() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("a").await);
        assert!(limiter.check("a").await);
        assert!(!limiter.check("a").await);
        assert!(limiter.check("b").await);
    }

    #[tokio::test]
    async fn test_cleanup_evicts_idle_buckets() {
        let limiter = RateLimiter::new(1);
        limiter.check("a").await;
        limiter.cleanup(Duration::ZERO).await;
        assert!(limiter.buckets.lock().await.is_empty());
    }

    #[test]
    fn test_client_key_prefers_forwarded_header() {
        let request = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_key(&request), "203.0.113.9");

        let mut request = axum::http::Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 4000))));
        assert_eq!(client_key(&request), "192.168.1.7");
    }
}
