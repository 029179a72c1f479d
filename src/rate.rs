//! Token-bucket rate limiting.
//!
//! Buckets start full and refill lazily: every acquire attempt first credits
//! the tokens earned by the whole intervals elapsed since the last refill.
//! There is no background refill task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Result;
use crate::scope::Scope;
use crate::stages::Stage;
use crate::stream::{self, Receiver, DEFAULT_CAPACITY};

/// Anything that hands out permission to proceed at a bounded rate.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Take a token if one is available right now.
    fn try_acquire(&self) -> bool;

    /// Wait for a token, or fail with the scope's cause once `scope` is
    /// cancelled.
    async fn acquire(&self, scope: &Scope) -> Result<()>;
}

#[derive(Debug)]
struct TokenBucket {
    capacity: usize,
    per_interval: usize,
    interval: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: usize,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: usize, per_interval: usize, interval: Duration) -> Self {
        Self {
            capacity,
            per_interval,
            interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_locked(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed();
        let intervals = elapsed.as_nanos() / self.interval.as_nanos();
        if intervals == 0 {
            return;
        }

        let earned = intervals.saturating_mul(self.per_interval as u128);
        let tokens = (state.tokens as u128).saturating_add(earned);
        state.tokens = tokens.min(self.capacity as u128) as usize;

        // Keep the fractional interval so partial progress is not lost.
        let credited = self.interval.as_nanos() * intervals;
        state.last_refill += Duration::from_nanos(credited.min(u64::MAX as u128) as u64);
    }

    fn refill(&self) {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
    }

    /// Take a token, or return how long until the next refill.
    fn try_take(&self) -> std::result::Result<(), Duration> {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
        if state.tokens > 0 {
            state.tokens -= 1;
            return Ok(());
        }
        let next = state.last_refill + self.interval;
        Err(next.saturating_duration_since(Instant::now()))
    }

    fn available(&self) -> usize {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
        state.tokens
    }

    async fn acquire(&self, scope: &Scope) -> Result<()> {
        loop {
            if let Some(error) = scope.err() {
                return Err(error);
            }
            match self.try_take() {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    tokio::select! {
                        biased;
                        _ = scope.cancelled() => return Err(scope.cause()),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }
}

/// A limiter allowing `limit` operations per `interval`.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: TokenBucket,
}

impl RateLimiter {
    /// Create a new limiter. A zero limit is treated as one and a zero
    /// interval as one second.
    pub fn new(limit: usize, interval: Duration) -> Self {
        let (limit, interval) = normalize(limit, interval);
        Self {
            bucket: TokenBucket::new(limit, limit, interval),
        }
    }

    /// Credit any tokens earned since the last refill.
    pub fn refill(&self) {
        self.bucket.refill();
    }

    /// Tokens currently available.
    pub fn available(&self) -> usize {
        self.bucket.available()
    }
}

#[async_trait]
impl Limiter for RateLimiter {
    fn try_acquire(&self) -> bool {
        self.bucket.try_take().is_ok()
    }

    async fn acquire(&self, scope: &Scope) -> Result<()> {
        self.bucket.acquire(scope).await
    }
}

/// A limiter that earns `limit` tokens per `interval` but can bank up to
/// `burst` of them.
#[derive(Debug)]
pub struct BurstRateLimiter {
    bucket: TokenBucket,
}

impl BurstRateLimiter {
    /// Create a new limiter. A zero burst means `limit`; bursts beyond twice
    /// the limit are capped there.
    pub fn new(limit: usize, interval: Duration, burst: usize) -> Self {
        let (limit, interval) = normalize(limit, interval);
        let burst = if burst == 0 { limit } else { burst };
        let capacity = burst.min(limit.saturating_mul(2));
        Self {
            bucket: TokenBucket::new(capacity, limit, interval),
        }
    }

    /// Credit any tokens earned since the last refill.
    pub fn refill(&self) {
        self.bucket.refill();
    }

    /// Tokens currently available.
    pub fn available(&self) -> usize {
        self.bucket.available()
    }

    /// Maximum tokens the bucket can hold.
    pub fn burst(&self) -> usize {
        self.bucket.capacity
    }
}

#[async_trait]
impl Limiter for BurstRateLimiter {
    fn try_acquire(&self) -> bool {
        self.bucket.try_take().is_ok()
    }

    async fn acquire(&self, scope: &Scope) -> Result<()> {
        self.bucket.acquire(scope).await
    }
}

fn normalize(limit: usize, interval: Duration) -> (usize, Duration) {
    let interval = if interval.is_zero() {
        Duration::from_secs(1)
    } else {
        interval
    };
    (limit.max(1), interval)
}

/// A passthrough stage that waits for a token before forwarding each item.
pub struct RateLimit<L> {
    limiter: Arc<L>,
}

impl<L> RateLimit<L> {
    /// Create a new rate limit stage
    pub fn new(limiter: L) -> Self {
        Self {
            limiter: Arc::new(limiter),
        }
    }

    /// Share an existing limiter, e.g. across several pipelines.
    pub fn shared(limiter: Arc<L>) -> Self {
        Self { limiter }
    }
}

impl<L, T> Stage<T, T> for RateLimit<L>
where
    L: Limiter + 'static,
    T: Send + 'static,
{
    fn apply(&self, scope: &Scope, input: Receiver<T>) -> Receiver<T> {
        let (output, rx) = stream::channel(DEFAULT_CAPACITY);
        let limiter = Arc::clone(&self.limiter);
        let scope = scope.clone();
        tokio::spawn(async move {
            while let Some(item) = input.recv_scoped(&scope).await {
                if limiter.acquire(&scope).await.is_err() {
                    break;
                }
                if output.send_scoped(&scope, item).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

/// Forward `input` at no more than `limit` items per `interval`.
pub fn rate_limit<T: Send + 'static>(
    scope: &Scope,
    input: Receiver<T>,
    limit: usize,
    interval: Duration,
) -> Receiver<T> {
    RateLimit::new(RateLimiter::new(limit, interval)).apply(scope, input)
}
