//! Shared request-rate limiter for every external call of a pipeline run.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket refilled at `requests_per_minute`, bursting up to the same amount.
#[derive(Debug, Clone)]
pub struct RequestLimiter {
    inner: Arc<DirectLimiter>,
    per_minute: u32,
}

impl RequestLimiter {
    /// `None` when the rate is zero, i.e. unlimited.
    pub fn per_minute(requests: u32) -> Option<Self> {
        let rate = NonZeroU32::new(requests)?;
        Some(Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_minute(rate))),
            per_minute: requests,
        })
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.per_minute
    }

    /// Wait until one request may be sent.
    pub async fn until_ready(&self) {
        self.inner.until_ready().await;
    }
}
