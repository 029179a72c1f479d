//! Success and error counters for a batch of work.
//!
//! With the `metrics` feature enabled every recorded outcome is also emitted
//! through the [`metrics`](::metrics) facade as `tributary_processed_total`
//! and `tributary_errors_total`, and [`Metrics::finish`] records the run time
//! in the `tributary_run_seconds` histogram.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::Result;
use crate::scope::Scope;

/// Shared outcome counters. Clones record into the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    processed: AtomicU64,
    errors: AtomicU64,
    started: Instant,
    finished: Mutex<Option<Instant>>,
}

impl Metrics {
    /// Start counting now
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                processed: AtomicU64::new(0),
                errors: AtomicU64::new(0),
                started: Instant::now(),
                finished: Mutex::new(None),
            }),
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        self.inner.processed.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        ::metrics::counter!("tributary_processed_total").increment(1);
    }

    /// Record a failed operation
    pub fn record_error(&self) {
        self.inner.errors.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        ::metrics::counter!("tributary_errors_total").increment(1);
    }

    /// Stop the clock. Only the first call has any effect.
    pub fn finish(&self) {
        let mut finished = self.inner.finished.lock();
        if finished.is_none() {
            let now = Instant::now();
            *finished = Some(now);
            #[cfg(feature = "metrics")]
            ::metrics::histogram!("tributary_run_seconds")
                .record((now - self.inner.started).as_secs_f64());
        }
    }

    /// Successful operations so far
    pub fn processed(&self) -> u64 {
        self.inner.processed.load(Ordering::Relaxed)
    }

    /// Failed operations so far
    pub fn errors(&self) -> u64 {
        self.inner.errors.load(Ordering::Relaxed)
    }

    /// Time from creation to [`finish`](Metrics::finish), or to now if the
    /// clock is still running.
    pub fn duration(&self) -> Duration {
        let end = (*self.inner.finished.lock()).unwrap_or_else(Instant::now);
        end - self.inner.started
    }

    /// Successes as a percentage of all outcomes, or 0 when nothing has been
    /// recorded.
    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        let total = processed + self.errors();
        if total == 0 {
            return 0.0;
        }
        processed as f64 / total as f64 * 100.0
    }

    /// Failures as a percentage of all outcomes, or 0 when nothing has been
    /// recorded.
    pub fn error_rate(&self) -> f64 {
        if self.processed() + self.errors() == 0 {
            return 0.0;
        }
        100.0 - self.success_rate()
    }

    /// Successful operations per second over [`duration`](Metrics::duration).
    pub fn throughput(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.processed() as f64 / secs
    }

    /// Wrap a processing function so each call's outcome is recorded here.
    pub fn instrument<F, Fut, In, Out>(
        &self,
        f: F,
    ) -> impl Fn(Scope, In) -> BoxFuture<'static, Result<Out>> + Clone + Send + Sync + 'static
    where
        F: Fn(Scope, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out>> + Send + 'static,
        In: Send + 'static,
        Out: Send + 'static,
    {
        let f = Arc::new(f);
        let metrics = self.clone();
        move |scope: Scope, item: In| {
            let outcome = f(scope, item);
            let metrics = metrics.clone();
            async move {
                let result = outcome.await;
                match &result {
                    Ok(_) => metrics.record_success(),
                    Err(_) => metrics.record_error(),
                }
                result
            }
            .boxed()
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
