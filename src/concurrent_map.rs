//! Bounded, order-preserving concurrent map over a finished collection.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::tracing_support::debug;

/// Apply `f` to every item with at most `concurrency` calls in flight, and
/// return the results in input order.
///
/// A `concurrency` of zero is treated as one. An empty input returns an
/// empty result without calling `f`.
///
/// The first failing call stops further launches; calls already running
/// are awaited, then that error is returned. Cancelling `scope` does the
/// same and returns the scope's cause. When both happen, the cancellation
/// is reported. A call that panics counts as a failure.
///
/// # Examples
///
/// ```rust
/// use tributary::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> tributary::Result<()> {
/// let scope = Scope::new();
/// let lengths = map_concurrent(&scope, vec!["a", "bb", "ccc"], 2, |_scope, s: &str| async move {
///     Ok(s.len())
/// })
/// .await?;
/// assert_eq!(lengths, vec![1, 2, 3]);
/// # Ok(())
/// # }
/// ```
pub async fn map_concurrent<T, R, F, Fut>(
    scope: &Scope,
    items: Vec<T>,
    concurrency: usize,
    f: F,
) -> Result<Vec<R>>
where
    F: Fn(Scope, T) -> Fut,
    Fut: Future<Output = Result<R>> + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let limit = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();
    let mut tasks = JoinSet::new();
    let mut first_error = None;

    'dispatch: for (index, item) in items.into_iter().enumerate() {
        let permit = loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => break 'dispatch,
                Some(joined) = tasks.join_next() => {
                    if let Err(error) = settle(joined, &mut slots) {
                        first_error = Some(error);
                        break 'dispatch;
                    }
                }
                permit = Arc::clone(&limit).acquire_owned() => match permit {
                    Ok(permit) => break permit,
                    Err(_) => break 'dispatch,
                },
            }
        };

        let call = f(scope.clone(), item);
        tasks.spawn(async move {
            let _permit = permit;
            (index, call.await)
        });
    }

    if first_error.is_some() || scope.is_cancelled() {
        debug!(in_flight = tasks.len(), "dispatch stopped, draining");
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(error) = settle(joined, &mut slots) {
            first_error.get_or_insert(error);
        }
    }

    if let Some(cause) = scope.err() {
        return Err(cause);
    }
    if let Some(error) = first_error {
        return Err(error);
    }
    slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::custom("concurrent map finished with unfilled slots"))
}

fn settle<R>(
    joined: std::result::Result<(usize, Result<R>), JoinError>,
    slots: &mut [Option<R>],
) -> Result<()> {
    let (index, result) = joined?;
    slots[index] = Some(result?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_preserves_order() {
        let scope = Scope::new();
        let items: Vec<u64> = (0..20).collect();

        // Later items finish first.
        let results = map_concurrent(&scope, items, 5, |_scope, x: u64| async move {
            tokio::time::sleep(Duration::from_millis(20 - x)).await;
            Ok(x * x)
        })
        .await
        .unwrap();

        assert_eq!(results, (0..20).map(|x| x * x).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let scope = Scope::new();
        let calls = AtomicUsize::new(0);
        let results = map_concurrent(&scope, Vec::<u8>::new(), 4, |_scope, x: u8| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(x) }
        })
        .await
        .unwrap();

        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        for limit in [0, 1, 3, 8] {
            let scope = Scope::new();
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let results = map_concurrent(&scope, (0..24).collect(), limit, |_scope, x: u32| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(x)
                }
            })
            .await
            .unwrap();

            assert_eq!(results.len(), 24);
            assert!(peak.load(Ordering::SeqCst) <= limit.max(1));
        }
    }

    #[tokio::test]
    async fn test_first_error_aborts() {
        let scope = Scope::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = map_concurrent(&scope, (0..10).collect(), 1, |_scope, x: u32| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if x == 2 {
                    Err(Error::custom("item 2 failed"))
                } else {
                    Ok(x)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "item 2 failed");
        assert!(calls.load(Ordering::SeqCst) < 10);
    }

    #[tokio::test]
    async fn test_cancellation_waits_for_in_flight() {
        let scope = Scope::new();
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            canceller.cancel();
        });

        let result = map_concurrent(&scope, (0..100).collect(), 4, |_scope, x: u32| {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(x)
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.load(Ordering::SeqCst) < 100);
        assert_eq!(
            started.load(Ordering::SeqCst),
            finished.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_error() {
        let scope = Scope::new();
        let result = map_concurrent(&scope, (0..10).collect(), 2, |scope, x: u32| async move {
            if x == 3 {
                scope.cancel();
                return Err(Error::custom("item 3 failed"));
            }
            Ok(x)
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_panicking_call_is_an_error() {
        let scope = Scope::new();
        let result = map_concurrent(&scope, vec![1, 2, 3], 2, |_scope, x: i32| async move {
            if x == 2 {
                panic!("worker blew up");
            }
            Ok(x)
        })
        .await;

        assert!(result.is_err());
    }
}
