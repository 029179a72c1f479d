//! Retry with exponential backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use rand::Rng;

use crate::error::Result;
use crate::scope::Scope;
use crate::tracing_support::debug;

/// Backoff settings for [`retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Scale each delay by a random factor in `[0.75, 1.25]`
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// The delay to wait after the failed attempt number `attempt`
    /// (zero-based), never more than `max_delay`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let max = self.max_delay.as_secs_f64();
        let mut delay = self.base_delay.as_secs_f64() * self.multiplier.powf(attempt as f64);
        if !delay.is_finite() || delay > max {
            delay = max;
        }
        if self.jitter {
            delay *= rand::rng().random_range(0.75..=1.25);
        }
        Duration::try_from_secs_f64(delay)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, up to `max_retries + 1` attempts.
///
/// Cancellation is checked before every attempt and interrupts the backoff
/// sleeps; it yields the scope's cause. An error that is not
/// [retryable](crate::Error::is_retryable) is returned immediately.
/// Otherwise the error of the final attempt is returned.
pub async fn retry<F, Fut, T>(scope: &Scope, config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if let Some(error) = scope.err() {
            return Err(error);
        }

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !error.is_retryable() || attempt >= config.max_retries {
            return Err(error);
        }

        let delay = config.delay_for(attempt);
        debug!(attempt, ?delay, %error, "attempt failed, backing off");
        tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(scope.cause()),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

/// Wrap a processing function so every call goes through [`retry`].
///
/// The result can be handed to a [`Pool`](crate::Pool) or any other place
/// that takes a processing function.
pub fn with_retry<F, Fut, In, Out>(
    f: F,
    config: RetryConfig,
) -> impl Fn(Scope, In) -> BoxFuture<'static, Result<Out>> + Clone + Send + Sync + 'static
where
    F: Fn(Scope, In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Out>> + Send + 'static,
    In: Clone + Send + Sync + 'static,
    Out: Send + 'static,
{
    let f = Arc::new(f);
    let config = Arc::new(config);
    move |scope: Scope, item: In| {
        let f = Arc::clone(&f);
        let config = Arc::clone(&config);
        async move { retry(&scope, &config, || f(scope.clone(), item.clone())).await }.boxed()
    }
}

/// [`retry`] with doubling delays capped at ten times `base_delay`.
pub async fn retry_with_backoff<F, Fut, T>(
    scope: &Scope,
    max_retries: usize,
    base_delay: Duration,
    op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let config = RetryConfig::default()
        .with_max_retries(max_retries)
        .with_base_delay(base_delay)
        .with_max_delay(base_delay.saturating_mul(10));
    retry(scope, &config, op).await
}

/// [`retry`] without an attempt limit, with delays capped at a hundred
/// times `base_delay`.
///
/// Only a non-retryable error or cancelling `scope` stops it.
pub async fn retry_forever<F, Fut, T>(scope: &Scope, base_delay: Duration, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let config = RetryConfig::default()
        .with_max_retries(usize::MAX)
        .with_base_delay(base_delay)
        .with_max_delay(base_delay.saturating_mul(100));
    retry(scope, &config, op).await
}
