//! Streaming stages.
//!
//! A [`Stage`] turns one stream into another. Applying a stage spawns the
//! task (or small fixed set of tasks) that drains the input and feeds a fresh
//! output stream; the stage alone closes that output, by dropping its sender
//! when the input is drained or the scope is cancelled.
//!
//! Stages compose by plain function composition: the output of one becomes
//! the input of the next, with no extra buffering in between.
//!
//! ```rust
//! use tributary::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let scope = Scope::new();
//! let doubled_evens = map(|x: i32| x * 2).then(filter(|x: &i32| x % 4 == 0));
//!
//! let output = doubled_evens.apply(&scope, from_iter(&scope, 1..=6));
//! assert_eq!(collect(output).await, vec![4, 8, 12]);
//! # }
//! ```

pub mod buffer;
pub mod split;
pub mod transform;

use std::marker::PhantomData;

use crate::scope::Scope;
use crate::stream::{self, Receiver, DEFAULT_CAPACITY};

pub use buffer::{buffer, Buffer};
pub use split::{merge, tee, Tee};
pub use transform::{batch, filter, map, unbatch, Batch, Filter, Map, Unbatch};

/// A streaming transformation from `Receiver<In>` to `Receiver<Out>`.
///
/// Any `Fn(&Scope, Receiver<In>) -> Receiver<Out>` closure is a stage.
pub trait Stage<In, Out>: Send + Sync {
    /// Start the stage on `input` and return its output stream.
    fn apply(&self, scope: &Scope, input: Receiver<In>) -> Receiver<Out>;
}

impl<F, In, Out> Stage<In, Out> for F
where
    F: Fn(&Scope, Receiver<In>) -> Receiver<Out> + Send + Sync,
{
    fn apply(&self, scope: &Scope, input: Receiver<In>) -> Receiver<Out> {
        self(scope, input)
    }
}

/// Extension trait for composing stages
pub trait StageExt<In, Mid>: Stage<In, Mid> + Sized {
    /// Feed this stage's output into `next`.
    fn then<Out, S>(self, next: S) -> Chain<Self, S, Mid>
    where
        S: Stage<Mid, Out>,
    {
        Chain::new(self, next)
    }
}

impl<In, Mid, S: Stage<In, Mid>> StageExt<In, Mid> for S {}

/// Two stages run back to back.
pub struct Chain<A, B, Mid> {
    first: A,
    second: B,
    _mid: PhantomData<fn() -> Mid>,
}

impl<A, B, Mid> Chain<A, B, Mid> {
    /// Create a chain that runs `first` and then `second`.
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _mid: PhantomData,
        }
    }
}

impl<A, B, In, Mid, Out> Stage<In, Out> for Chain<A, B, Mid>
where
    A: Stage<In, Mid>,
    B: Stage<Mid, Out>,
{
    fn apply(&self, scope: &Scope, input: Receiver<In>) -> Receiver<Out> {
        self.second.apply(scope, self.first.apply(scope, input))
    }
}

/// Copy `input` to a fresh output stream until it drains or `scope` is
/// cancelled.
pub fn passthrough<T: Send + 'static>(scope: &Scope, input: Receiver<T>) -> Receiver<T> {
    let (output, rx) = stream::channel(DEFAULT_CAPACITY);
    let scope = scope.clone();
    tokio::spawn(async move {
        forward(&scope, &input, &output).await;
    });
    rx
}

/// Move items from `input` to `output` until either side is done.
pub(crate) async fn forward<T>(scope: &Scope, input: &Receiver<T>, output: &stream::Sender<T>) {
    forward_with(scope, input, output, Some).await;
}

/// Like [`forward`], passing each item through `step`; `None` skips it.
pub(crate) async fn forward_with<In, Out>(
    scope: &Scope,
    input: &Receiver<In>,
    output: &stream::Sender<Out>,
    mut step: impl FnMut(In) -> Option<Out>,
) {
    while let Some(item) = input.recv_scoped(scope).await {
        let Some(item) = step(item) else { continue };
        if output.send_scoped(scope, item).await.is_err() {
            break;
        }
    }
}
