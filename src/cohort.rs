//! Task cohorts: the set of tasks spawned by one pool or fan call.

use std::future::Future;

use tokio_util::task::TaskTracker;

use crate::stream::Sender;
use crate::tracing_support::debug;

/// Tracks every task of one invocation and closes the shared output stream
/// once the last of them has exited.
pub(crate) struct Cohort {
    tracker: TaskTracker,
    label: &'static str,
}

impl Cohort {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            tracker: TaskTracker::new(),
            label,
        }
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Seal the cohort and hand `output` to a completion task.
    ///
    /// The completion task holds the last sender outside the cohort, so the
    /// stream closes exactly when every cohort task has returned (each task
    /// drops its own sender clone on the way out).
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub(crate) fn close_when_done<T: Send + 'static>(self, output: Sender<T>) {
        let Cohort { tracker, label } = self;
        tracker.close();
        debug!(cohort = label, tasks = tracker.len(), "cohort started");
        tokio::spawn(async move {
            tracker.wait().await;
            drop(output);
            debug!(cohort = label, "cohort finished, output closed");
        });
    }
}
