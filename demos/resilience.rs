//! Retry, circuit breaking, rate limiting and metrics around a flaky service
//!
//! Run with: cargo run --example resilience

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tributary::prelude::*;

/// Fails every third call.
#[derive(Default)]
struct FlakyService {
    calls: AtomicUsize,
}

impl FlakyService {
    async fn fetch(&self, id: u32) -> Result<String> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if self.calls.fetch_add(1, Ordering::SeqCst) % 3 == 2 {
            return Err(Error::retryable(format!("service hiccup on {id}")));
        }
        Ok(format!("record-{id}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let options = PoolOptions::default()
        .with_workers(4)
        .with_retry(3, Duration::from_millis(10))
        .with_rate_limit(Some(RateLimitOptions::default().with_limit(50, Duration::from_secs(1))));

    let root = Scope::new();
    let scope = options.scope(&root);
    let service = Arc::new(FlakyService::default());
    let breaker = Arc::new(CircuitBreaker::new(10, Duration::from_secs(1)));
    let metrics = Metrics::new();

    let fetch = {
        let service = Arc::clone(&service);
        let breaker = Arc::clone(&breaker);
        move |scope: Scope, id: u32| {
            let service = Arc::clone(&service);
            let breaker = Arc::clone(&breaker);
            async move { breaker.call(&scope, || service.fetch(id)).await }
        }
    };
    let pool = Pool::with_options(
        &options,
        metrics.instrument(with_retry(fetch, options.retry_config())),
    );

    let ids = from_iter(&scope, 1..=40);
    let input = match options.rate_limit.as_ref() {
        Some(limit) => RateLimit::new(limit.limiter()).apply(&scope, ids),
        None => ids,
    };

    let records = collect(pool.run(&scope, input)).await;
    metrics.finish();

    println!("fetched {} records", records.len());
    println!("service calls: {}", service.calls.load(Ordering::SeqCst));
    println!("breaker: {}", breaker.state());
    println!(
        "success rate {:.1}%, throughput {:.1}/s over {:?}",
        metrics.success_rate(),
        metrics.throughput(),
        metrics.duration()
    );

    Ok(())
}
