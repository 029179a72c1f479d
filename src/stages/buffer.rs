//! A queueing stage with an explicit overflow policy.

use std::collections::VecDeque;

use crate::config::BackpressureOptions;
use crate::scope::Scope;
use crate::stages::Stage;
use crate::stream::{self, Receiver, DEFAULT_CAPACITY};
use crate::tracing_support::trace;

/// A stage that decouples a fast producer from a slow consumer through a
/// local queue of up to `max_buffer_size` items.
///
/// What happens when the queue is full depends on the options:
///
/// - `block_on_full`: stop reading the input until the consumer catches up.
/// - `drop_oldest`: evict the oldest queued item to make room.
/// - neither: discard the incoming item.
///
/// `drop_oldest` takes precedence over `block_on_full`. Queued items are
/// flushed after the input drains; cancellation discards them.
#[derive(Debug, Clone)]
pub struct Buffer {
    options: BackpressureOptions,
}

impl Buffer {
    /// Create a new buffer stage
    pub fn new(options: BackpressureOptions) -> Self {
        Self { options }
    }
}

/// Create a [`Buffer`] stage.
pub fn buffer(options: BackpressureOptions) -> Buffer {
    Buffer::new(options)
}

impl<T: Send + 'static> Stage<T, T> for Buffer {
    fn apply(&self, scope: &Scope, input: Receiver<T>) -> Receiver<T> {
        let (output, rx) = stream::channel(DEFAULT_CAPACITY);
        let max = self.options.max_buffer_size.max(1);
        let drop_oldest = self.options.drop_oldest;
        let block = self.options.block_on_full && !drop_oldest;
        let scope = scope.clone();

        tokio::spawn(async move {
            let mut queue = VecDeque::new();
            let mut input_open = true;

            loop {
                if !input_open && queue.is_empty() {
                    break;
                }
                let accepting = input_open && (!block || queue.len() < max);

                tokio::select! {
                    biased;
                    _ = scope.cancelled() => break,
                    permit = output.reserve(), if !queue.is_empty() => {
                        let Ok(permit) = permit else { break };
                        if let Some(item) = queue.pop_front() {
                            permit.send(item);
                        }
                    }
                    item = input.recv(), if accepting => {
                        let Some(item) = item else {
                            input_open = false;
                            continue;
                        };
                        if queue.len() < max {
                            queue.push_back(item);
                        } else if drop_oldest {
                            queue.pop_front();
                            queue.push_back(item);
                            trace!(max, "buffer full, dropped oldest item");
                        } else {
                            trace!(max, "buffer full, dropped newest item");
                        }
                    }
                }
            }
        });
        rx
    }
}
