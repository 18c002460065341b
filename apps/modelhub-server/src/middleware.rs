//! Control-plane rate limiting.
//!
//! A single token bucket in front of `/v1/admin` keeps a misbehaving
//! operator script from starving the data plane. This is deliberately
//! separate from the per-connection quotas the router enforces.

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::clock::Clock;
use governor::middleware::StateInformationMiddleware;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

/// Bucket plus the precomputed response headers.
pub struct AdminRateLimiter {
    bucket: DefaultDirectRateLimiter<StateInformationMiddleware>,
    policy: HeaderValue,
    burst: HeaderValue,
}

impl AdminRateLimiter {
    /// # Errors
    /// Returns an error if the configured rps or burst is zero.
    pub fn new(rps: u32, burst: u32) -> Result<Self> {
        let bucket = RateLimiter::direct(
            Quota::per_second(NonZeroU32::new(rps).with_context(|| anyhow!("rps is zero"))?)
                .allow_burst(NonZeroU32::new(burst).with_context(|| anyhow!("burst is zero"))?),
        )
        .with_middleware::<StateInformationMiddleware>();
        let policy = HeaderValue::from_str(&format!("\"burst\";q={burst};w={rps}"))
            .context("Failed to create rate limit policy")?;
        Ok(Self {
            bucket,
            policy,
            burst: burst.into(),
        })
    }
}

/// Gate `/v1/admin` requests through the bucket; everything else passes.
pub async fn admin_rate_limit(
    State(limiter): State<Arc<AdminRateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    if !req.uri().path().starts_with("/v1/admin") {
        return next.run(req).await;
    }

    match limiter.bucket.check() {
        Ok(state) => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert("RateLimit-Policy", limiter.policy.clone());
            headers.insert("RateLimit-Limit", limiter.burst.clone());
            headers.insert(
                "RateLimit-Remaining",
                state.remaining_burst_capacity().into(),
            );
            response
        }
        Err(not_until) => {
            let wait = not_until.wait_time_from(limiter.bucket.clock().now());
            let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, wait.as_secs().max(1).into());
            response
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn zero_rates_are_rejected() {
        assert!(AdminRateLimiter::new(0, 10).is_err());
        assert!(AdminRateLimiter::new(10, 0).is_err());
    }

    #[test]
    fn burst_is_admitted_then_limited() {
        let limiter = AdminRateLimiter::new(1, 3).expect("limiter");
        for _ in 0..3 {
            assert!(limiter.bucket.check().is_ok());
        }
        assert!(limiter.bucket.check().is_err());
    }
}
