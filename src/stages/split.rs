//! Stages that split one stream into many, or join many into one.

use futures::future::{join, join_all};
use parking_lot::Mutex;

use crate::cohort::Cohort;
use crate::scope::Scope;
use crate::stages::{forward, Stage};
use crate::stream::{self, Receiver, Sender, DEFAULT_CAPACITY};

/// A stage that copies every item to a set of side outputs as well as to
/// its own output.
///
/// Side sends run concurrently with each other and with the primary send,
/// and the stage waits for all of them before taking the next item, so a
/// slow consumer on any branch slows every branch. The side outputs are
/// closed when the input drains or the scope is cancelled.
///
/// The side outputs are handed to the first [`apply`](Stage::apply); a tee
/// applied a second time only feeds its primary output.
pub struct Tee<T> {
    outputs: Mutex<Option<Vec<Sender<T>>>>,
}

impl<T> Tee<T> {
    /// Create a new tee over `outputs`
    pub fn new(outputs: Vec<Sender<T>>) -> Self {
        Self {
            outputs: Mutex::new(Some(outputs)),
        }
    }
}

/// Create a [`Tee`] stage.
pub fn tee<T>(outputs: impl IntoIterator<Item = Sender<T>>) -> Tee<T> {
    Tee::new(outputs.into_iter().collect())
}

impl<T> Stage<T, T> for Tee<T>
where
    T: Clone + Send + 'static,
{
    fn apply(&self, scope: &Scope, input: Receiver<T>) -> Receiver<T> {
        let (output, rx) = stream::channel(DEFAULT_CAPACITY);
        let mut sides = self.outputs.lock().take().unwrap_or_default();
        let scope = scope.clone();

        tokio::spawn(async move {
            let mut primary = Some(output);
            while let Some(item) = input.recv_scoped(&scope).await {
                let side_sends = join_all(sides.iter().map(|side| side.send(item.clone())));
                let primary_send = async {
                    match &primary {
                        Some(output) => output.send(item).await.is_ok(),
                        None => false,
                    }
                };

                let (primary_open, side_results) = tokio::select! {
                    biased;
                    _ = scope.cancelled() => break,
                    sent = join(primary_send, side_sends) => sent,
                };

                // Branches whose consumers went away stop receiving copies.
                if !primary_open {
                    primary = None;
                }
                let mut results = side_results.into_iter();
                sides.retain(|_| matches!(results.next(), Some(Ok(()))));

                if primary.is_none() && sides.is_empty() {
                    break;
                }
            }
            // Dropping `sides` and `primary` closes every output.
        });
        rx
    }
}

/// Merge several streams into one, without transformation.
///
/// One forwarding task runs per input; the output closes once every input
/// has drained or `scope` is cancelled. Items from one input keep their
/// order, but inputs interleave arbitrarily. With no inputs the returned
/// stream is already closed.
pub fn merge<T, I>(scope: &Scope, inputs: I) -> Receiver<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Receiver<T>>,
{
    let (output, rx) = stream::channel(DEFAULT_CAPACITY);
    let cohort = Cohort::new("merge");

    for input in inputs {
        let output = output.clone();
        let scope = scope.clone();
        cohort.spawn(async move {
            forward(&scope, &input, &output).await;
        });
    }

    cohort.close_when_done(output);
    rx
}
