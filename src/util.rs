//! Producers that feed a stream and collectors that drain one.

use std::future::Future;
use std::time::Duration;

use tokio_stream::{Stream, StreamExt};

use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::stream::{self, Receiver, DEFAULT_CAPACITY};
use crate::tracing_support::trace;

/// Feed the items of `iter` into a fresh stream, then close it.
///
/// The producer task stops early if `scope` is cancelled or every receiver
/// goes away.
pub fn from_iter<I>(scope: &Scope, iter: I) -> Receiver<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    let (output, rx) = stream::channel(DEFAULT_CAPACITY);
    let iter = iter.into_iter();
    let scope = scope.clone();
    tokio::spawn(async move {
        for item in iter {
            if output.send_scoped(&scope, item).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Feed the items of an async stream into a fresh stream, then close it.
pub fn from_stream<S>(scope: &Scope, source: S) -> Receiver<S::Item>
where
    S: Stream + Send + 'static,
    S::Item: Send + 'static,
{
    let (output, rx) = stream::channel(DEFAULT_CAPACITY);
    let scope = scope.clone();
    tokio::spawn(async move {
        tokio::pin!(source);
        loop {
            let next = tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                next = source.next() => next,
            };
            let Some(item) = next else { break };
            if output.send_scoped(&scope, item).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Call `f` repeatedly and feed what it yields into a fresh stream.
///
/// The stream closes when `f` returns `Ok(None)` or an error.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub fn from_fn<F, Fut, T>(scope: &Scope, mut f: F) -> Receiver<T>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    T: Send + 'static,
{
    let (output, rx) = stream::channel(DEFAULT_CAPACITY);
    let scope = scope.clone();
    tokio::spawn(async move {
        loop {
            let item = match scope.run(f()).await {
                Ok(Ok(Some(item))) => item,
                Ok(Ok(None)) | Err(_) => break,
                Ok(Err(error)) => {
                    trace!(%error, "producer function failed, closing stream");
                    break;
                }
            };
            if output.send_scoped(&scope, item).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Drain `input` until it closes.
pub async fn collect<T>(input: Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Some(item) = input.recv().await {
        items.push(item);
    }
    items
}

/// Drain `input`, failing with [`Error::Timeout`] if it has not closed
/// within `timeout`.
pub async fn collect_with_timeout<T>(input: Receiver<T>, timeout: Duration) -> Result<Vec<T>> {
    tokio::time::timeout(timeout, collect(input))
        .await
        .map_err(|_| Error::timeout(timeout.as_millis() as u64))
}
