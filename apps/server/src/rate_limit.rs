//! Per-IP token-bucket rate limiting (§6.1: "2 burst, 1/30s refill").

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

const BUCKET_CAPACITY: f64 = 2.0;
/// One token every 30 seconds.
const REFILL_PER_SEC: f64 = 1.0 / 30.0;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Shared registry of per-IP buckets. A `Mutex<HashMap<..>>` is fine here:
/// the critical section is a handful of float ops, never I/O.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_acquire(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let bucket = buckets.entry(ip).or_insert_with(|| Bucket { tokens: BUCKET_CAPACITY, last_refill: now });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * REFILL_PER_SEC).min(BUCKET_CAPACITY);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Axum middleware: rejects with `429` once a client IP exhausts its bucket.
/// Requires the server to be served with `into_make_service_with_connect_info`
/// so `ConnectInfo<SocketAddr>` is available.
pub async fn enforce(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    axum::extract::State(limiter): axum::extract::State<std::sync::Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if limiter.try_acquire(addr.ip()) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::too_many_requests())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_of_two_then_throttled() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.try_acquire(ip));
        assert!(limiter.try_acquire(ip));
        assert!(!limiter.try_acquire(ip));
    }

    #[test]
    fn distinct_ips_have_independent_buckets() {
        let limiter = RateLimiter::new();
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        assert!(limiter.try_acquire(a));
        assert!(limiter.try_acquire(a));
        assert!(!limiter.try_acquire(a));
        assert!(limiter.try_acquire(b));
    }
}
