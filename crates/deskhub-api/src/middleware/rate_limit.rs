//! # Rate Limiting
//!
//! Fixed-window rate limiter keyed by client address. It runs before
//! authentication, so nothing from the `Authorization` header is trusted
//! for keying. In-memory only; each process counts on its own. Expired
//! buckets are dropped on every check.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;

use crate::error::ErrorBody;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window duration in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_secs: 60,
        }
    }
}

/// Per-key rate limit state.
#[derive(Debug, Clone)]
struct BucketState {
    count: u64,
    window_start: Instant,
}

/// Shared rate limiter state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<String, BucketState>>>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check if a request from the given key should be allowed.
    fn check(&self, key: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);
        buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window);

        let bucket = buckets.entry(key.to_string()).or_insert(BucketState {
            count: 0,
            window_start: now,
        });

        if bucket.count >= self.config.max_requests {
            false
        } else {
            bucket.count += 1;
            true
        }
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

/// Key a request by forwarding headers, then the peer address.
fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()));
    if let Some(addr) = forwarded {
        return format!("addr:{addr}");
    }

    match peer {
        Some(addr) => format!("addr:{}", addr.ip()),
        None => "anonymous".to_string(),
    }
}

/// Middleware that enforces per-client rate limits.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();

    if let Some(limiter) = limiter {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let key = client_key(request.headers(), peer);

        if !limiter.check(&key) {
            tracing::warn!(key = %key, "rate limit exceeded");
            let body = ErrorBody::new("RATE_LIMITED", "rate limit exceeded");
            return (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 3,
            window_secs: 60,
        });
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        // Other keys have their own bucket.
        assert!(limiter.check("b"));
    }

    #[test]
    fn zero_length_window_resets_immediately() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window_secs: 0,
        });
        assert!(limiter.check("a"));
        assert!(limiter.check("a"));
    }

    #[test]
    fn expired_buckets_are_dropped() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window_secs: 0,
        });
        for i in 0..10 {
            assert!(limiter.check(&format!("addr:10.0.0.{i}")));
        }
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn bearer_header_does_not_change_the_key() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer 550e8400-e29b-41d4-a716-446655440000|abc"),
        );
        let peer: SocketAddr = "192.168.1.5:4000".parse().unwrap();
        assert_eq!(client_key(&headers, Some(peer)), "addr:192.168.1.5");
        assert_eq!(client_key(&headers, None), "anonymous");
    }

    #[test]
    fn forged_token_ids_share_one_bucket() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window_secs: 60,
        });
        let peer: SocketAddr = "203.0.113.7:5000".parse().unwrap();
        let allowed = (0..100)
            .filter(|i| {
                let mut headers = HeaderMap::new();
                let bearer = format!("Bearer fake-{i}|x");
                headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&bearer).unwrap());
                limiter.check(&client_key(&headers, Some(peer)))
            })
            .count();
        assert_eq!(allowed, 1);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn key_falls_back_to_addresses() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.0.0.1, 172.16.0.1"),
        );
        assert_eq!(client_key(&headers, None), "addr:10.0.0.1");

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_key(&headers, None), "addr:10.0.0.2");

        let peer: SocketAddr = "192.168.1.5:4000".parse().unwrap();
        assert_eq!(client_key(&HeaderMap::new(), Some(peer)), "addr:192.168.1.5");
        assert_eq!(client_key(&HeaderMap::new(), None), "anonymous");
    }
}
