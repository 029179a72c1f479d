//! Integration tests for pools, pipelines, fans and the resilience helpers

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tributary::prelude::*;

const GRACE: Duration = Duration::from_secs(2);

async fn assert_closes<T>(output: Receiver<T>) {
    let tail = collect_with_timeout(output, GRACE).await;
    assert!(tail.is_ok(), "stream did not close in time");
}

#[tokio::test]
async fn test_pipeline_map_twice_then_filter() {
    let scope = Scope::new();
    let mut pipeline = Pipeline::new(&scope);
    pipeline
        .add_stage(map(|x: i64| x * 2))
        .add_stage(map(|x: i64| x))
        .add_stage(filter(|x: &i64| x % 2 == 0));

    let output = pipeline.run(from_iter(&scope, 1..=10));
    assert_eq!(
        collect(output).await,
        vec![2, 4, 6, 8, 10, 12, 14, 16, 18, 20]
    );
}

#[tokio::test]
async fn test_batch_then_unbatch_roundtrip_through_pool() {
    let scope = Scope::new();
    let sum_batch = Pool::new(2, |_scope, batch: Vec<u32>| async move {
        Ok(batch.iter().sum::<u32>())
    });

    let batches = batch(3).apply(&scope, from_iter(&scope, 1..=7u32));
    let mut sums = collect(sum_batch.run(&scope, batches)).await;
    sums.sort();
    assert_eq!(sums, vec![6, 7, 15]);
}

#[tokio::test]
async fn test_chained_stages_change_type() {
    let scope = Scope::new();
    let words = map(|n: usize| "ab".repeat(n))
        .then(filter(|s: &String| !s.is_empty()))
        .then(map(|s: String| s.len()));

    let output = words.apply(&scope, from_iter(&scope, 0..4));
    assert_eq!(collect(output).await, vec![2, 4, 6]);
}

#[tokio::test]
async fn test_tee_feeds_side_pipeline() {
    let scope = Scope::new();
    let (audit_tx, audit_rx) = channel(4);

    let pipeline = Pipeline::builder(&scope)
        .stage(tee(vec![audit_tx]))
        .stage(map(|x: u8| x * 10))
        .build();

    let audit = tokio::spawn(collect(audit_rx));
    let output = collect(pipeline.run(from_iter(&scope, 1..=3))).await;

    assert_eq!(output, vec![10, 20, 30]);
    assert_eq!(audit.await.unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_merge_then_pipeline() {
    let scope = Scope::new();
    let merged = merge(
        &scope,
        vec![from_iter(&scope, vec![1, 3, 5]), from_iter(&scope, vec![2, 4])],
    );

    let pipeline = Pipeline::builder(&scope)
        .stage(map(|x: i32| x + 1))
        .build();
    let mut output = collect(pipeline.run(merged)).await;
    output.sort();
    assert_eq!(output, vec![2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_no_leak_after_cancel() {
    let scope = Scope::new();
    let (_held_open, input) = channel::<u32>(1);
    let echo = |_scope: Scope, x: u32| async move { Ok(x) };

    let pool = Pool::new(3, echo);
    let pipeline = Pipeline::builder(&scope)
        .stage(map(|x: u32| x))
        .stage(batch(4).then(unbatch()))
        .build();

    let outputs = vec![
        pool.run(&scope, input.clone()),
        pipeline.run(input.clone()),
        fan_out(&scope, input.clone(), 2, echo),
        fan_out_fan_in(&scope, input.clone(), 2, echo),
        round_robin(&scope, input.clone(), 2, echo),
        fan_in(&scope, vec![input.clone(), input]),
    ];

    scope.cancel();
    for output in outputs {
        assert_closes(output).await;
    }
}

#[tokio::test]
async fn test_no_leak_after_drain() {
    let scope = Scope::new();
    let echo = |_scope: Scope, x: u32| async move { Ok(x) };

    let outputs = vec![
        Pool::new(3, echo).run(&scope, from_iter(&scope, 0..10)),
        fan_out(&scope, from_iter(&scope, 0..10), 2, echo),
        fan_out_fan_in(&scope, from_iter(&scope, 0..10), 2, echo),
        round_robin(&scope, from_iter(&scope, 0..10), 2, echo),
    ];

    for output in outputs {
        let items = collect_with_timeout(output, GRACE).await.unwrap();
        assert_eq!(items.len(), 10);
    }
    assert!(!scope.is_cancelled());
}

#[tokio::test]
async fn test_fan_in_completeness() {
    let scope = Scope::new();
    let (n, k) = (6, 25);
    let sources: Vec<_> = (0..n)
        .map(|source| from_iter(&scope, (0..k).map(move |i| (source, i))))
        .collect();

    let merged = collect(fan_in(&scope, sources)).await;
    assert_eq!(merged.len(), n * k);
    assert_eq!(merged.into_iter().collect::<HashSet<_>>().len(), n * k);
}

#[tokio::test]
async fn test_round_robin_with_uneven_work() {
    let scope = Scope::new();
    // The first lane always gets the slow items; the others keep going.
    let uneven = |_scope: Scope, item: u64| async move {
        if item % 3 == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(item)
    };

    let output = round_robin(&scope, from_iter(&scope, 0..30), 3, uneven);
    let mut results = collect(output).await;
    results.sort();
    assert_eq!(results, (0..30).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_map_concurrent_aborts_on_error() {
    let scope = Scope::new();
    let result = map_concurrent(&scope, (0..50).collect(), 4, |_scope, x: u32| async move {
        if x == 17 {
            Err(Error::custom(format!("item {x} is cursed")))
        } else {
            Ok(x)
        }
    })
    .await;

    assert_eq!(result.unwrap_err().to_string(), "item 17 is cursed");
}

#[tokio::test]
async fn test_map_concurrent_respects_bound() {
    let scope = Scope::new();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let results = map_concurrent(&scope, (0..40).collect(), 3, |_scope, x: u64| {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(x + 1)
        }
    })
    .await
    .unwrap();

    assert_eq!(results, (1..=40).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn test_map_concurrent_deadline() {
    let scope = Scope::new().with_timeout(Duration::from_millis(20));
    let result = map_concurrent(&scope, (0..1000).collect(), 2, |_scope, x: u32| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(x)
    })
    .await;

    assert!(matches!(result, Err(Error::DeadlineExceeded)));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let scope = Scope::new();
    let pipeline = Pipeline::builder(&scope)
        .stage(map(|x: i32| x))
        .build();
    let (tx, input) = channel(1);
    let output = pipeline.run(input);

    pipeline.close();
    pipeline.close();
    scope.cancel();
    scope.cancel();

    assert!(pipeline.is_closed());
    assert_closes(output).await;
    drop(tx);
}

#[tokio::test]
async fn test_pool_with_retry_and_circuit_breaker() {
    let scope = Scope::new();
    let breaker = Arc::new(CircuitBreaker::new(5, Duration::from_secs(60)));
    let attempts = Arc::new(AtomicUsize::new(0));

    let guarded = {
        let breaker = Arc::clone(&breaker);
        let attempts = Arc::clone(&attempts);
        move |scope: Scope, x: u32| {
            let breaker = Arc::clone(&breaker);
            let attempts = Arc::clone(&attempts);
            async move {
                breaker
                    .call(&scope, || async move {
                        // Every item fails once before succeeding.
                        if attempts.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                            Err(Error::custom("transient"))
                        } else {
                            Ok(x)
                        }
                    })
                    .await
            }
        }
    };

    let config = RetryConfig::default()
        .with_base_delay(Duration::from_millis(1))
        .with_jitter(false);
    let pool = Pool::new(1, with_retry(guarded, config));

    let results = collect(pool.run(&scope, from_iter(&scope, 1..=4))).await;
    assert_eq!(results, vec![1, 2, 3, 4]);
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(attempts.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn test_pool_options_drive_everything() {
    let options = PoolOptions::default()
        .with_workers(2)
        .with_buffer_size(8)
        .with_timeout(Duration::from_secs(5))
        .with_rate_limit(Some(RateLimitOptions::default().with_limit(1000, Duration::from_secs(1))));

    let root = Scope::new();
    let scope = options.scope(&root);
    let metrics = Metrics::new();
    let pool = Pool::with_options(
        &options,
        metrics.instrument(|_scope, x: u32| async move { Ok(x * 3) }),
    );

    let limiter = options.rate_limit.as_ref().map(RateLimitOptions::limiter);
    let input = match limiter {
        Some(limiter) => RateLimit::new(limiter).apply(&scope, from_iter(&scope, 0..20)),
        None => from_iter(&scope, 0..20),
    };

    let mut results = collect(pool.run(&scope, input)).await;
    results.sort();
    metrics.finish();

    assert_eq!(results, (0..20).map(|x| x * 3).collect::<Vec<_>>());
    assert_eq!(metrics.processed(), 20);
    assert_eq!(metrics.error_rate(), 0.0);
}

#[tokio::test]
async fn test_buffer_stage_in_pipeline() {
    let scope = Scope::new();
    let pipeline = Pipeline::builder(&scope)
        .stage(buffer(BackpressureOptions::default().with_max_buffer_size(16)))
        .stage(map(|x: u16| x + 1))
        .build();

    let output = collect(pipeline.run(from_iter(&scope, 0..100))).await;
    assert_eq!(output, (1..=100).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_from_stream_into_fan_out() {
    let scope = Scope::new();
    let source = from_stream(&scope, tokio_stream::iter(1..=5));
    let output = fan_out(&scope, source, 2, |_scope, x: i32| async move { Ok(-x) });

    let mut results = collect(output).await;
    results.sort();
    assert_eq!(results, vec![-5, -4, -3, -2, -1]);
}
