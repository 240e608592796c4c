//! Backoff schedule and the two seams that make it testable: sleeping and jitter.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use notewise_llm::ErrorClass;
use rand::Rng;

/// How quickly the delay grows for a given failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    /// `base * 2^attempt + U(0, 1)`: network, timeout, empty response.
    Standard,
    /// `base * 3^attempt + U(1, 3)`: rate limiting and server faults.
    Slow,
    /// `base * 2^attempt`, no jitter: unclassified failures.
    Flat,
}

impl BackoffKind {
    /// `None` for classes that must not be retried.
    pub fn for_class(class: ErrorClass) -> Option<Self> {
        match class {
            ErrorClass::Network | ErrorClass::Timeout | ErrorClass::EmptyResponse => {
                Some(BackoffKind::Standard)
            }
            ErrorClass::RateLimit | ErrorClass::ServerFault => Some(BackoffKind::Slow),
            ErrorClass::Unknown => Some(BackoffKind::Flat),
            ErrorClass::ClientFault => None,
        }
    }

    fn factor(self) -> f64 {
        match self {
            BackoffKind::Standard | BackoffKind::Flat => 2.0,
            BackoffKind::Slow => 3.0,
        }
    }

    fn jitter_range(self) -> Option<(f64, f64)> {
        match self {
            BackoffKind::Standard => Some((0.0, 1.0)),
            BackoffKind::Slow => Some((1.0, 3.0)),
            BackoffKind::Flat => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the next attempt, after zero-based `attempt` failed.
    pub fn delay(&self, kind: BackoffKind, attempt: u32, jitter: &dyn Jitter) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut secs = self.base.as_secs_f64() * kind.factor().powi(exp);
        if let Some((low, high)) = kind.jitter_range() {
            secs += jitter.sample(low, high);
        }
        let capped = secs.min(self.max.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

/// Source of backoff jitter.
pub trait Jitter: Send + Sync {
    /// A value in `[low, high]`.
    fn sample(&self, low: f64, high: f64) -> f64;
}

/// Uniform jitter from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        rand::thread_rng().gen_range(low..=high)
    }
}

/// Deterministic jitter at a fixed fraction of the range (0.0 = low, 1.0 = high).
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn sample(&self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.0.clamp(0.0, 1.0)
    }
}

/// Where the invoker waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested delay, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .map(|slept| slept.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
        tokio::task::yield_now().await;
    }
}
