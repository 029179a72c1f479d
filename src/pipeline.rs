//! Pipeline orchestration.
//!
//! A [`Pipeline`] is an ordered list of same-typed stages sharing one
//! cancellation scope. Running it wires the stages back to back; closing it
//! cancels every stage of every run at once.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::scope::Scope;
use crate::stages::{passthrough, Stage};
use crate::stream::Receiver;
use crate::tracing_support::debug;

/// An ordered chain of `T -> T` stages running under a child scope.
///
/// To change the item type part way through, compose the stages with
/// [`StageExt::then`](crate::stages::StageExt::then) and add the result as a
/// single stage.
///
/// # Examples
///
/// ```rust
/// use tributary::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() {
/// let scope = Scope::new();
/// let pipeline = Pipeline::builder(&scope)
///     .stage(map(|x: i32| x * 2))
///     .stage(filter(|x: &i32| x % 3 == 0))
///     .build();
///
/// let output = pipeline.run(from_iter(&scope, 1..=9));
/// assert_eq!(collect(output).await, vec![6, 12, 18]);
/// # }
/// ```
pub struct Pipeline<T> {
    stages: Vec<Box<dyn Stage<T, T>>>,
    scope: Scope,
    closed: AtomicBool,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Create an empty pipeline under a child of `parent`.
    pub fn new(parent: &Scope) -> Self {
        Self {
            stages: Vec::new(),
            scope: parent.child(),
            closed: AtomicBool::new(false),
        }
    }

    /// Start building a pipeline under a child of `parent`.
    pub fn builder(parent: &Scope) -> PipelineBuilder<T> {
        PipelineBuilder {
            pipeline: Self::new(parent),
        }
    }

    /// Append a stage.
    pub fn add_stage<S>(&mut self, stage: S) -> &mut Self
    where
        S: Stage<T, T> + 'static,
    {
        self.stages.push(Box::new(stage));
        self
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The scope every run executes under.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Feed `input` through every stage in order and return the last
    /// stage's output.
    ///
    /// An empty pipeline copies `input` to a fresh stream. Each call spawns
    /// a fresh set of stage tasks.
    pub fn run(&self, input: Receiver<T>) -> Receiver<T> {
        if self.stages.is_empty() {
            return passthrough(&self.scope, input);
        }
        self.stages
            .iter()
            .fold(input, |stream, stage| stage.apply(&self.scope, stream))
    }

    /// Cancel the pipeline's scope, stopping every run. Later calls do
    /// nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(stages = self.stages.len(), "closing pipeline");
        self.scope.cancel();
    }

    /// Whether [`close`](Pipeline::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Builder for a [`Pipeline`]
pub struct PipelineBuilder<T> {
    pipeline: Pipeline<T>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Append a stage
    pub fn stage<S>(mut self, stage: S) -> Self
    where
        S: Stage<T, T> + 'static,
    {
        self.pipeline.add_stage(stage);
        self
    }

    /// Finish building
    pub fn build(self) -> Pipeline<T> {
        self.pipeline
    }
}
