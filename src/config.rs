//! Option structs for pools, rate limits, buffering and scopes.
//!
//! Every struct has a `Default` matching the crate's stock tuning and a set
//! of `with_*` methods for overriding single fields.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::rate::BurstRateLimiter;
use crate::retry::RetryConfig;
use crate::scope::Scope;

/// Configuration for a worker pool and the collaborators around it.
///
/// [`Pool::with_options`](crate::pool::Pool::with_options) reads only
/// `workers` and `buffer_size`. The remaining fields take effect through
/// [`scope`](PoolOptions::scope), [`retry_config`](PoolOptions::retry_config)
/// and [`RateLimitOptions::limiter`], which the caller wires in.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolOptions {
    /// Number of workers per run
    pub workers: usize,
    /// Slots on each run's output stream
    pub buffer_size: usize,
    /// Time budget for a whole run, see [`PoolOptions::scope`]
    pub timeout: Duration,
    /// Retries per item, see [`PoolOptions::retry_config`]
    pub retry_count: usize,
    /// Base backoff between retries, see [`PoolOptions::retry_config`]
    pub backoff: Duration,
    /// Optional rate limit, turned into a limiter by [`RateLimitOptions::limiter`]
    pub rate_limit: Option<RateLimitOptions>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            buffer_size: 100,
            timeout: Duration::from_secs(30),
            retry_count: 3,
            backoff: Duration::from_millis(100),
            rate_limit: Some(RateLimitOptions::default()),
        }
    }
}

impl PoolOptions {
    /// Set the number of workers
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the output buffer size
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the run timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry count and base backoff
    pub fn with_retry(mut self, retry_count: usize, backoff: Duration) -> Self {
        self.retry_count = retry_count;
        self.backoff = backoff;
        self
    }

    /// Set or clear the rate limit
    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimitOptions>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Retry settings derived from `retry_count` and `backoff`.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_retries(self.retry_count)
            .with_base_delay(self.backoff)
    }

    /// A child of `parent` that expires after `timeout`.
    pub fn scope(&self, parent: &Scope) -> Scope {
        parent.with_timeout(self.timeout)
    }
}

/// Token-bucket rate limit settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RateLimitOptions {
    /// Tokens added per interval
    pub limit: usize,
    /// Refill interval
    pub interval: Duration,
    /// Bucket capacity; zero means `limit`
    pub burst: usize,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            interval: Duration::from_secs(1),
            burst: 200,
        }
    }
}

impl RateLimitOptions {
    /// Set the limit per interval
    pub fn with_limit(mut self, limit: usize, interval: Duration) -> Self {
        self.limit = limit;
        self.interval = interval;
        self
    }

    /// Set the burst capacity
    pub fn with_burst(mut self, burst: usize) -> Self {
        self.burst = burst;
        self
    }

    /// Build a limiter from these settings.
    pub fn limiter(&self) -> BurstRateLimiter {
        BurstRateLimiter::new(self.limit, self.interval, self.burst)
    }
}

/// Overflow policy for the [`buffer`](crate::stages::buffer) stage
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BackpressureOptions {
    /// Items held before the policy kicks in
    pub max_buffer_size: usize,
    /// Evict the oldest queued item when full
    pub drop_oldest: bool,
    /// Stop reading upstream when full
    pub block_on_full: bool,
}

impl Default for BackpressureOptions {
    fn default() -> Self {
        Self {
            max_buffer_size: 1000,
            drop_oldest: false,
            block_on_full: true,
        }
    }
}

impl BackpressureOptions {
    /// Set the queue size
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size;
        self
    }

    /// Enable or disable evicting the oldest item
    pub fn with_drop_oldest(mut self, drop_oldest: bool) -> Self {
        self.drop_oldest = drop_oldest;
        self
    }

    /// Enable or disable blocking upstream
    pub fn with_block_on_full(mut self, block_on_full: bool) -> Self {
        self.block_on_full = block_on_full;
        self
    }
}

/// Settings for a root scope
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContextOptions {
    /// Lifetime of the scope
    pub timeout: Duration,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl ContextOptions {
    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A new root scope that expires after `timeout`.
    pub fn scope(&self) -> Scope {
        Scope::new().with_timeout(self.timeout)
    }
}
