//! One-task stages that reshape a stream item by item.

use std::sync::Arc;

use crate::scope::Scope;
use crate::stages::{forward_with, Stage};
use crate::stream::{self, Receiver, DEFAULT_CAPACITY};

/// A stage that maps each item through a function, preserving order.
pub struct Map<F> {
    f: Arc<F>,
}

impl<F> Map<F> {
    /// Create a new map stage
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

/// Create a [`Map`] stage.
pub fn map<F>(f: F) -> Map<F> {
    Map::new(f)
}

impl<F, In, Out> Stage<In, Out> for Map<F>
where
    F: Fn(In) -> Out + Send + Sync + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn apply(&self, scope: &Scope, input: Receiver<In>) -> Receiver<Out> {
        let (output, rx) = stream::channel(DEFAULT_CAPACITY);
        let f = Arc::clone(&self.f);
        let scope = scope.clone();
        tokio::spawn(async move {
            forward_with(&scope, &input, &output, |item| Some(f(item))).await;
        });
        rx
    }
}

/// A stage that keeps only the items matching a predicate.
pub struct Filter<P> {
    predicate: Arc<P>,
}

impl<P> Filter<P> {
    /// Create a new filter stage
    pub fn new(predicate: P) -> Self {
        Self {
            predicate: Arc::new(predicate),
        }
    }
}

/// Create a [`Filter`] stage.
pub fn filter<P>(predicate: P) -> Filter<P> {
    Filter::new(predicate)
}

impl<P, T> Stage<T, T> for Filter<P>
where
    P: Fn(&T) -> bool + Send + Sync + 'static,
    T: Send + 'static,
{
    fn apply(&self, scope: &Scope, input: Receiver<T>) -> Receiver<T> {
        let (output, rx) = stream::channel(DEFAULT_CAPACITY);
        let predicate = Arc::clone(&self.predicate);
        let scope = scope.clone();
        tokio::spawn(async move {
            forward_with(&scope, &input, &output, |item| predicate(&item).then_some(item)).await;
        });
        rx
    }
}

/// A stage that groups items into ordered batches of a fixed size.
///
/// When the input drains, a final short batch is flushed if any items are
/// pending. A cancelled scope discards the pending batch.
#[derive(Debug, Clone, Copy)]
pub struct Batch {
    size: usize,
}

impl Batch {
    /// Create a new batch stage. A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    /// Number of items per full batch.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Create a [`Batch`] stage.
pub fn batch(size: usize) -> Batch {
    Batch::new(size)
}

impl<T: Send + 'static> Stage<T, Vec<T>> for Batch {
    fn apply(&self, scope: &Scope, input: Receiver<T>) -> Receiver<Vec<T>> {
        let (output, rx) = stream::channel(DEFAULT_CAPACITY);
        let size = self.size;
        let scope = scope.clone();
        tokio::spawn(async move {
            let mut pending = Vec::with_capacity(size);
            while let Some(item) = input.recv_scoped(&scope).await {
                pending.push(item);
                if pending.len() >= size {
                    let full = std::mem::replace(&mut pending, Vec::with_capacity(size));
                    if output.send_scoped(&scope, full).await.is_err() {
                        return;
                    }
                }
            }
            if !pending.is_empty() {
                let _ = output.send_scoped(&scope, pending).await;
            }
        });
        rx
    }
}

/// A stage that flattens batches back into single items, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbatch;

/// Create an [`Unbatch`] stage.
pub fn unbatch() -> Unbatch {
    Unbatch
}

impl<I> Stage<I, I::Item> for Unbatch
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    fn apply(&self, scope: &Scope, input: Receiver<I>) -> Receiver<I::Item> {
        let (output, rx) = stream::channel(DEFAULT_CAPACITY);
        let scope = scope.clone();
        tokio::spawn(async move {
            while let Some(group) = input.recv_scoped(&scope).await {
                for item in group {
                    if output.send_scoped(&scope, item).await.is_err() {
                        return;
                    }
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{collect, from_iter};
    use std::time::Duration;

    #[tokio::test]
    async fn test_map_preserves_order() {
        let scope = Scope::new();
        let output = map(|x: u32| x * 3).apply(&scope, from_iter(&scope, 1..=4));
        assert_eq!(collect(output).await, vec![3, 6, 9, 12]);
    }

    #[tokio::test]
    async fn test_map_can_change_type() {
        let scope = Scope::new();
        let output = map(|x: u32| format!("#{x}")).apply(&scope, from_iter(&scope, 1..=2));
        assert_eq!(collect(output).await, vec!["#1", "#2"]);
    }

    #[tokio::test]
    async fn test_filter() {
        let scope = Scope::new();
        let output = filter(|x: &i64| x % 2 == 0).apply(&scope, from_iter(&scope, 1..11));
        assert_eq!(collect(output).await, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn test_batch_flushes_partial_batch() {
        let scope = Scope::new();
        let output = batch(3).apply(&scope, from_iter(&scope, 1..8));
        assert_eq!(
            collect(output).await,
            vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]
        );
    }

    #[tokio::test]
    async fn test_batch_sizes() {
        for len in 0..12usize {
            for size in 1..5usize {
                let scope = Scope::new();
                let batches = collect(batch(size).apply(&scope, from_iter(&scope, 0..len))).await;

                let full = batches.iter().filter(|b| b.len() == size).count();
                assert_eq!(full, len / size);
                assert_eq!(batches.len(), len / size + usize::from(len % size != 0));
                assert_eq!(batches.concat(), (0..len).collect::<Vec<_>>());
            }
        }
    }

    #[tokio::test]
    async fn test_zero_batch_size_wraps_items() {
        let scope = Scope::new();
        let output = batch(0).apply(&scope, from_iter(&scope, vec!['a', 'b']));
        assert_eq!(collect(output).await, vec![vec!['a'], vec!['b']]);
    }

    #[tokio::test]
    async fn test_unbatch() {
        let scope = Scope::new();
        let groups = vec![vec![1, 2], vec![], vec![3], vec![4, 5, 6]];
        let output = unbatch().apply(&scope, from_iter(&scope, groups));
        assert_eq!(collect(output).await, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_stage_exits_on_cancel() {
        let scope = Scope::new();
        let (_held_open, input) = stream::channel::<i32>(1);
        let output = map(|x: i32| x).apply(&scope, input);

        scope.cancel();
        let closed = tokio::time::timeout(Duration::from_secs(1), output.recv()).await;
        assert_eq!(closed.unwrap(), None);
    }
}
