//! Process-wide token bucket in front of the API routes.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::debug;

use crate::handlers::error_response;

pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded, try again later!";

/// One token per `period`, holding at most `burst`. Clones share the bucket.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl RateLimit {
    /// `None` if `period` or `burst` is zero.
    pub fn new(period: Duration, burst: u32) -> Option<Self> {
        let quota = Quota::with_period(period)?.allow_burst(NonZeroU32::new(burst)?);
        Some(Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Take a token if one is available.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Reject the request with 429 when the bucket is empty.
pub async fn enforce(State(limit): State<RateLimit>, req: Request, next: Next) -> Response {
    if limit.try_acquire() {
        return next.run(req).await;
    }
    debug!(method = %req.method(), path = %req.uri().path(), "rate limited");
    error_response(RATE_LIMITED_MESSAGE, StatusCode::TOO_MANY_REQUESTS)
}
