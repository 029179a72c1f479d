//! Fixed-size worker pools.

use std::future::Future;
use std::sync::Arc;

use crate::cohort::Cohort;
use crate::config::PoolOptions;
use crate::error::Result;
use crate::scope::Scope;
use crate::stages::Stage;
use crate::stream::{self, Receiver, DEFAULT_CAPACITY};
use crate::tracing_support::trace;

/// A fixed number of workers draining one input stream into one output
/// stream through a processing function.
///
/// The pool itself holds no per-run state: every [`run`](Pool::run) spawns a
/// fresh cohort of workers and returns a fresh output stream, which closes
/// once every worker of that cohort has exited.
///
/// Items whose processing fails are dropped. Callers that need per-item
/// errors should return a `Result` as the output value itself.
///
/// # Examples
///
/// ```rust
/// use tributary::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() {
/// let scope = Scope::new();
/// let pool = Pool::new(4, |_scope, x: u64| async move { Ok(x * x) });
///
/// let input = from_iter(&scope, 1..=5);
/// let mut squares = collect(pool.run(&scope, input)).await;
/// squares.sort();
/// assert_eq!(squares, vec![1, 4, 9, 16, 25]);
/// # }
/// ```
pub struct Pool<F> {
    workers: usize,
    buffer: usize,
    f: Arc<F>,
}

impl<F> Pool<F> {
    /// Create a pool of `workers` workers. Zero workers is treated as one.
    pub fn new<In, Out, Fut>(workers: usize, f: F) -> Self
    where
        F: Fn(Scope, In) -> Fut,
        Fut: Future<Output = Result<Out>>,
    {
        Self::shared(workers, Arc::new(f))
    }

    /// Create a pool sized by `options.workers`, with `options.buffer_size`
    /// slots on each run's output stream.
    ///
    /// The timeout, retry and rate-limit fields are not applied here; derive
    /// them with [`PoolOptions::scope`], [`PoolOptions::retry_config`] and
    /// [`RateLimitOptions::limiter`](crate::config::RateLimitOptions::limiter).
    pub fn with_options<In, Out, Fut>(options: &PoolOptions, f: F) -> Self
    where
        F: Fn(Scope, In) -> Fut,
        Fut: Future<Output = Result<Out>>,
    {
        Self {
            workers: options.workers.max(1),
            buffer: options.buffer_size.max(1),
            f: Arc::new(f),
        }
    }

    pub(crate) fn shared(workers: usize, f: Arc<F>) -> Self {
        Self {
            workers: workers.max(1),
            buffer: DEFAULT_CAPACITY,
            f,
        }
    }

    /// Number of workers spawned per run.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn the workers and return their output stream.
    ///
    /// Each worker loops: stop if `scope` is cancelled, take the next input
    /// (stop if the input is drained), process it, and send the result on
    /// unless processing failed. The caller should drain the output until it
    /// closes or cancel `scope`.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn run<In, Out, Fut>(&self, scope: &Scope, input: Receiver<In>) -> Receiver<Out>
    where
        F: Fn(Scope, In) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out>> + Send + 'static,
        In: Send + 'static,
        Out: Send + 'static,
    {
        let (output, results) = stream::channel(self.buffer);
        let cohort = Cohort::new("pool");

        for worker in 0..self.workers {
            let input = input.clone();
            let output = output.clone();
            let f = Arc::clone(&self.f);
            let scope = scope.clone();

            cohort.spawn(async move {
                while let Some(item) = input.recv_scoped(&scope).await {
                    match f(scope.clone(), item).await {
                        Ok(result) => {
                            if output.send_scoped(&scope, result).await.is_err() {
                                break;
                            }
                        }
                        Err(error) => {
                            trace!(worker, %error, "dropping item after processing error");
                        }
                    }
                }
            });
        }

        cohort.close_when_done(output);
        results
    }
}

impl<F> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            workers: self.workers,
            buffer: self.buffer,
            f: Arc::clone(&self.f),
        }
    }
}

impl<F> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("workers", &self.workers)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<F, In, Out, Fut> Stage<In, Out> for Pool<F>
where
    F: Fn(Scope, In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Out>> + Send + 'static,
    In: Send + 'static,
    Out: Send + 'static,
{
    fn apply(&self, scope: &Scope, input: Receiver<In>) -> Receiver<Out> {
        self.run(scope, input)
    }
}
