//! Rate limiting.
//!
//! Two mechanisms:
//! - `api_rate_limiter`: governor token bucket in front of the JSON API (~100/min)
//! - [`ReviewRateLimiter`]: sliding window for review submissions (5/hour)
//!
//! Both key on the real client address resolved from proxy headers.

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{HeaderMap, Request, request::Parts};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use moka::future::Cache;
use thiserror::Error;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

use crate::error::AppError;

// =============================================================================
// Client IP resolution for Cloudflare + Fly.io
// =============================================================================

/// Real client address from proxy headers, in order of trust:
/// `CF-Connecting-IP`, first `X-Forwarded-For` hop, `X-Real-IP`, `Fly-Client-IP`.
#[must_use]
pub fn ip_from_headers(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("cf-connecting-ip")
        .and_then(|s| s.trim().parse().ok())
        .or_else(|| {
            header("x-forwarded-for")
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse().ok())
        })
        .or_else(|| header("x-real-ip").and_then(|s| s.trim().parse().ok()))
        .or_else(|| header("fly-client-ip").and_then(|s| s.trim().parse().ok()))
}

/// Key extractor for governor: proxy headers, then the socket address.
#[derive(Clone, Copy)]
pub struct CloudflareIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for CloudflareIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        ip_from_headers(req.headers())
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Extractor yielding the client address for handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        ip_from_headers(&parts.headers)
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .map(Self)
            .ok_or_else(|| AppError::BadRequest("could not determine client address".to_owned()))
    }
}

// =============================================================================
// Governor layer
// =============================================================================

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<CloudflareIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for general API: ~100 requests per minute per IP.
///
/// Configuration: 1 request per second (replenish), burst of 50.
///
/// # Panics
///
/// This function will not panic. The configuration uses only valid positive
/// integers (`per_second(1)` and `burst_size(50)`), which are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn api_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(CloudflareIpKeyExtractor)
        .per_second(1)
        .burst_size(50)
        .finish()
        .expect("rate limiter config with per_second(1) and burst_size(50) is valid");
    GovernorLayer::new(Arc::new(config))
}

// =============================================================================
// Review sliding window
// =============================================================================

/// Review submissions allowed per address per window.
pub const REVIEWS_PER_WINDOW: usize = 5;

/// Length of the review window.
pub const REVIEW_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Addresses tracked at once; least recently used beyond this are dropped.
const MAX_TRACKED_ADDRESSES: u64 = 10_000;

/// The address has used up its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("too many submissions, try again in {} minutes", .retry_after.as_secs().div_ceil(60))]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

/// Sliding-window limiter keyed by client address.
///
/// Each address keeps the instants of its recent attempts. Entries idle for
/// a full window are evicted, and the cache is bounded so a flood of
/// addresses cannot grow memory without limit.
#[derive(Clone)]
pub struct ReviewRateLimiter {
    limit: usize,
    window: Duration,
    hits: Cache<IpAddr, Arc<Mutex<VecDeque<Instant>>>>,
}

impl Default for ReviewRateLimiter {
    fn default() -> Self {
        Self::new(REVIEWS_PER_WINDOW, REVIEW_WINDOW)
    }
}

impl ReviewRateLimiter {
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        let hits = Cache::builder()
            .max_capacity(MAX_TRACKED_ADDRESSES)
            .time_to_idle(window)
            .build();
        Self { limit, window, hits }
    }

    /// Record an attempt now.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] when the address is over budget.
    pub async fn check(&self, client: IpAddr) -> Result<(), RateLimitExceeded> {
        self.check_at(client, Instant::now()).await
    }

    /// Record an attempt at `now`. Rejected attempts are not recorded.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] when the address is over budget.
    pub async fn check_at(&self, client: IpAddr, now: Instant) -> Result<(), RateLimitExceeded> {
        let history = self
            .hits
            .get_with(client, async { Arc::new(Mutex::new(VecDeque::new())) })
            .await;
        let mut attempts = history.lock().unwrap_or_else(PoisonError::into_inner);

        while attempts
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            attempts.pop_front();
        }

        if attempts.len() >= self.limit {
            let oldest = attempts.front().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.saturating_duration_since(oldest));
            tracing::warn!(client = %client, "Review rate limit exceeded");
            return Err(RateLimitExceeded { retry_after });
        }

        attempts.push_back(now);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    #[test]
    fn test_ip_header_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("fly-client-ip", HeaderValue::from_static("10.0.0.4"));
        assert_eq!(ip_from_headers(&headers), Some(ip("10.0.0.4")));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(ip_from_headers(&headers), Some(ip("203.0.113.7")));

        headers.insert("cf-connecting-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(ip_from_headers(&headers), Some(ip("198.51.100.2")));
    }

    #[test]
    fn test_ip_headers_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(ip_from_headers(&headers), None);
    }

    #[tokio::test]
    async fn test_sixth_within_window_is_rejected() {
        let limiter = ReviewRateLimiter::default();
        let start = Instant::now();
        let client = ip("203.0.113.9");

        for minute in 0..5 {
            limiter
                .check_at(client, start + Duration::from_secs(minute * 60))
                .await
                .unwrap();
        }

        let err = limiter
            .check_at(client, start + Duration::from_secs(10 * 60))
            .await
            .unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(50 * 60));
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = ReviewRateLimiter::default();
        let start = Instant::now();
        let client = ip("203.0.113.9");

        for _ in 0..5 {
            limiter.check_at(client, start).await.unwrap();
        }
        assert!(limiter.check_at(client, start + Duration::from_secs(30 * 60)).await.is_err());
        assert!(limiter.check_at(client, start + REVIEW_WINDOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_addresses_are_independent() {
        let limiter = ReviewRateLimiter::new(1, REVIEW_WINDOW);
        let now = Instant::now();
        limiter.check_at(ip("203.0.113.1"), now).await.unwrap();
        limiter.check_at(ip("203.0.113.2"), now).await.unwrap();
        assert!(limiter.check_at(ip("203.0.113.1"), now).await.is_err());
    }
}
