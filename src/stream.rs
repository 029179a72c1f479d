//! Typed, closable conduits between tasks.
//!
//! A stream is a bounded multi-producer, multi-consumer queue. Any number of
//! [`Sender`]s feed it and any number of [`Receiver`]s race to drain it. The
//! stream closes exactly once, when its last sender is dropped; receivers then
//! drain what is buffered and get `None`, which is distinct from any value.
//!
//! Every component in this crate talks to streams through the scoped
//! operations ([`Receiver::recv_scoped`], [`Sender::send_scoped`]), which race
//! the operation against cancellation so no task outlives its scope.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use futures_core::Stream;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::scope::Scope;

/// Capacity used by stage and worker output streams.
pub const DEFAULT_CAPACITY: usize = 1;

/// Create a bounded stream. A capacity of zero is treated as one.
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buffer: VecDeque::new(),
            capacity: capacity.max(1),
            reserved: 0,
            senders: 1,
            receivers: 1,
        }),
        item_ready: Notify::new(),
        slot_ready: Notify::new(),
    });

    (
        Sender {
            shared: Arc::clone(&shared),
        },
        Receiver { shared },
    )
}

/// Create a stream whose sends never wait for room.
pub fn unbounded<T>() -> (Sender<T>, Receiver<T>) {
    channel(usize::MAX)
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Wakes receivers when an item arrives or the stream closes
    item_ready: Notify,
    /// Wakes senders when a slot frees up or the last receiver leaves
    slot_ready: Notify,
}

struct State<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    reserved: usize,
    senders: usize,
    receivers: usize,
}

impl<T> State<T> {
    fn has_room(&self) -> bool {
        self.buffer.len() + self.reserved < self.capacity
    }
}

/// Error returned by [`Sender::send`] and [`Sender::send_scoped`].
///
/// The unsent value is handed back in either case.
#[derive(PartialEq, Eq)]
pub enum SendError<T> {
    /// Every receiver is gone
    Closed(T),
    /// The scope was cancelled before the value could be queued
    Cancelled(T),
}

impl<T> SendError<T> {
    /// Recover the value that could not be sent.
    pub fn into_inner(self) -> T {
        match self {
            SendError::Closed(value) | SendError::Cancelled(value) => value,
        }
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed(_) => write!(f, "Closed(..)"),
            SendError::Cancelled(_) => write!(f, "Cancelled(..)"),
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed(_) => write!(f, "sending on a stream with no receivers"),
            SendError::Cancelled(_) => write!(f, "send cancelled"),
        }
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Error returned by [`Sender::try_send`].
#[derive(PartialEq, Eq)]
pub enum TrySendError<T> {
    /// The buffer is full; sending now would block
    Full(T),
    /// Every receiver is gone
    Closed(T),
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Full(_) => write!(f, "Full(..)"),
            TrySendError::Closed(_) => write!(f, "Closed(..)"),
        }
    }
}

/// Error returned by [`Receiver::try_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing buffered yet, but producers remain; receiving now would block
    Empty,
    /// The stream is closed and drained
    Closed,
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "stream is empty"),
            TryRecvError::Closed => write!(f, "stream is closed"),
        }
    }
}

impl std::error::Error for TryRecvError {}

/// Returned by [`Sender::reserve`] when no receiver is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// The producing half of a stream.
pub struct Sender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Sender<T> {
    /// Wait for room and queue `value`.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        match self.reserve().await {
            Ok(permit) => {
                permit.send(value);
                Ok(())
            }
            Err(Disconnected) => Err(SendError::Closed(value)),
        }
    }

    /// Like [`send`](Self::send), but gives up as soon as `scope` is cancelled.
    ///
    /// Cancellation is checked first, so a cancelled scope never queues.
    pub async fn send_scoped(&self, scope: &Scope, value: T) -> Result<(), SendError<T>> {
        tokio::select! {
            biased;
            _ = scope.cancelled() => Err(SendError::Cancelled(value)),
            permit = self.reserve() => match permit {
                Ok(permit) => {
                    permit.send(value);
                    Ok(())
                }
                Err(Disconnected) => Err(SendError::Closed(value)),
            },
        }
    }

    /// Queue `value` only if there is room right now.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        {
            let mut state = self.shared.state.lock();
            if state.receivers == 0 {
                return Err(TrySendError::Closed(value));
            }
            if !state.has_room() {
                return Err(TrySendError::Full(value));
            }
            state.buffer.push_back(value);
        }
        self.shared.item_ready.notify_one();
        Ok(())
    }

    /// Wait for a free slot and hold it.
    ///
    /// Dropping the returned permit without sending releases the slot, and
    /// dropping the future before it resolves reserves nothing, so the
    /// reservation can be raced against other reservations.
    pub async fn reserve(&self) -> Result<Permit<'_, T>, Disconnected> {
        loop {
            let notified = self.shared.slot_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if state.receivers == 0 {
                    return Err(Disconnected);
                }
                if state.has_room() {
                    state.reserved += 1;
                    return Ok(Permit {
                        shared: Some(&self.shared),
                    });
                }
            }

            notified.await;
        }
    }

    /// Whether every receiver has gone away.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().receivers == 0
    }

    /// The stream's buffer capacity.
    pub fn capacity(&self) -> usize {
        self.shared.state.lock().capacity
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.shared.state.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let closed = {
            let mut state = self.shared.state.lock();
            state.senders -= 1;
            state.senders == 0
        };
        if closed {
            self.shared.item_ready.notify_waiters();
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A reserved slot in a stream's buffer.
pub struct Permit<'a, T> {
    shared: Option<&'a Shared<T>>,
}

impl<T> Permit<'_, T> {
    /// Fill the reserved slot. Never waits.
    pub fn send(mut self, value: T) {
        if let Some(shared) = self.shared.take() {
            {
                let mut state = shared.state.lock();
                state.reserved -= 1;
                state.buffer.push_back(value);
            }
            shared.item_ready.notify_one();
        }
    }
}

impl<T> Drop for Permit<'_, T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.state.lock().reserved -= 1;
            shared.slot_ready.notify_one();
        }
    }
}

/// The consuming half of a stream.
pub struct Receiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Receiver<T> {
    /// Wait for the next value. `None` means the stream is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.shared.item_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_recv() {
                Ok(value) => return Some(value),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => {}
            }

            notified.await;
        }
    }

    /// Like [`recv`](Self::recv), but yields `None` once `scope` is cancelled.
    ///
    /// Cancellation is checked first, so a cancelled scope never dequeues.
    pub async fn recv_scoped(&self, scope: &Scope) -> Option<T> {
        tokio::select! {
            biased;
            _ = scope.cancelled() => None,
            item = self.recv() => item,
        }
    }

    /// Take a value if one is buffered right now.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let value = {
            let mut state = self.shared.state.lock();
            match state.buffer.pop_front() {
                Some(value) => value,
                None if state.senders == 0 => return Err(TryRecvError::Closed),
                None => return Err(TryRecvError::Empty),
            }
        };
        self.shared.slot_ready.notify_one();
        Ok(value)
    }

    /// Whether the stream is closed and nothing is left to read.
    pub fn is_closed(&self) -> bool {
        let state = self.shared.state.lock();
        state.senders == 0 && state.buffer.is_empty()
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adapt this receiver into a [`futures_core::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        T: Send,
    {
        futures::stream::unfold(self, |rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        })
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.shared.state.lock().receivers += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let (orphaned, disconnected) = {
            let mut state = self.shared.state.lock();
            state.receivers -= 1;
            if state.receivers == 0 {
                (std::mem::take(&mut state.buffer), true)
            } else {
                (VecDeque::new(), false)
            }
        };
        // Buffered values are dropped outside the lock.
        drop(orphaned);
        if disconnected {
            self.shared.slot_ready.notify_waiters();
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("buffered", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
