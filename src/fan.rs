//! Fan-out and fan-in over worker pools.
//!
//! Four ways to spread one input stream over several workers:
//!
//! - [`fan_out`]: workers race on the shared input.
//! - [`fan_out_fan_in`]: a distributor hands each item to whichever worker
//!   lane frees up first.
//! - [`round_robin`]: a distributor hands items to worker lanes in strict
//!   rotation.
//! - [`fan_in`]: the reverse, many streams merged into one.
//!
//! None of them order results across workers.

use std::future::Future;
use std::sync::Arc;

use futures::future::select_all;

use crate::error::Result;
use crate::pool::Pool;
use crate::scope::Scope;
use crate::stages::merge;
use crate::stream::{self, Receiver, SendError, Sender};

/// Process `input` with `workers` workers racing to take items.
///
/// Identical to running a [`Pool`] of that size.
pub fn fan_out<In, Out, F, Fut>(
    scope: &Scope,
    input: Receiver<In>,
    workers: usize,
    f: F,
) -> Receiver<Out>
where
    F: Fn(Scope, In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Out>> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    Pool::new(workers, f).run(scope, input)
}

/// Merge `inputs` into one stream that closes once all of them have.
///
/// With no inputs the result is already closed.
pub fn fan_in<T, I>(scope: &Scope, inputs: I) -> Receiver<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Receiver<T>>,
{
    merge(scope, inputs)
}

/// Give each of `workers` workers its own input lane and route every item
/// to the first lane with room.
///
/// Each lane is served by a single worker, so a slow item holds up only its
/// own lane. Results are merged with [`fan_in`].
pub fn fan_out_fan_in<In, Out, F, Fut>(
    scope: &Scope,
    input: Receiver<In>,
    workers: usize,
    f: F,
) -> Receiver<Out>
where
    F: Fn(Scope, In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Out>> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    let (lanes, outputs) = spawn_lanes(scope, workers, f);
    let distributor = scope.clone();
    tokio::spawn(async move {
        distribute_first_ready(&distributor, input, lanes).await;
    });
    fan_in(scope, outputs)
}

/// Like [`fan_out_fan_in`], but items are assigned to lanes in strict
/// rotation: item `i` goes to worker `i % workers`.
///
/// Assignment is deterministic and even; completion order is not.
pub fn round_robin<In, Out, F, Fut>(
    scope: &Scope,
    input: Receiver<In>,
    workers: usize,
    f: F,
) -> Receiver<Out>
where
    F: Fn(Scope, In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Out>> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    let (lanes, outputs) = spawn_lanes(scope, workers, f);
    let distributor = scope.clone();
    tokio::spawn(async move {
        distribute_round_robin(&distributor, input, lanes).await;
    });
    fan_in(scope, outputs)
}

/// Start one single-worker pool per lane, sharing `f`.
fn spawn_lanes<In, Out, F, Fut>(
    scope: &Scope,
    workers: usize,
    f: F,
) -> (Vec<Sender<In>>, Vec<Receiver<Out>>)
where
    F: Fn(Scope, In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Out>> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    let f = Arc::new(f);
    (0..workers.max(1))
        .map(|_| {
            let (lane, lane_rx) = stream::channel(1);
            let output = Pool::shared(1, Arc::clone(&f)).run(scope, lane_rx);
            (lane, output)
        })
        .unzip()
}

/// Route each item to whichever lane can take it first. Lanes whose worker
/// has gone away are dropped from the rotation.
async fn distribute_first_ready<T>(scope: &Scope, input: Receiver<T>, mut lanes: Vec<Sender<T>>) {
    while let Some(item) = input.recv_scoped(scope).await {
        let mut pending = Some(item);
        while let Some(value) = pending.take() {
            if lanes.is_empty() {
                return;
            }
            let outcome = {
                let reservations = lanes.iter().map(|lane| Box::pin(lane.reserve()));
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => return,
                    (reserved, index, _) = select_all(reservations) => match reserved {
                        Ok(permit) => {
                            permit.send(value);
                            None
                        }
                        Err(_) => Some((index, value)),
                    },
                }
            };
            if let Some((index, value)) = outcome {
                lanes.swap_remove(index);
                pending = Some(value);
            }
        }
    }
}

/// Route item `i` to lane `i % lanes.len()`. A lane whose worker has gone
/// away leaves the rotation and its item goes to the next live lane.
async fn distribute_round_robin<T>(scope: &Scope, input: Receiver<T>, mut lanes: Vec<Sender<T>>) {
    let mut next = 0;
    while let Some(item) = input.recv_scoped(scope).await {
        let mut pending = item;
        loop {
            if lanes.is_empty() {
                return;
            }
            match lanes[next].send_scoped(scope, pending).await {
                Ok(()) => {
                    next = (next + 1) % lanes.len();
                    break;
                }
                Err(SendError::Cancelled(_)) => return,
                Err(SendError::Closed(value)) => {
                    lanes.remove(next);
                    if next >= lanes.len() {
                        next = 0;
                    }
                    pending = value;
                }
            }
        }
    }
}
