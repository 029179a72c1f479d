//! Cancellation scopes.
//!
//! A [`Scope`] is the cancellation context every component runs under. It
//! wraps a [`CancellationToken`] and remembers *why* it was cancelled, so
//! callers can tell an explicit cancel from an expired deadline.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::{Error, Result};
use crate::tracing_support::debug;

/// Why a scope stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`Scope::cancel`] was called on this scope or an ancestor
    Cancelled,
    /// A deadline set by [`Scope::with_deadline`] or [`Scope::with_timeout`] passed
    DeadlineExceeded,
}

/// A cancellation scope shared by all tasks of a call tree.
///
/// Cloning is cheap and every clone observes the same cancellation.
/// Cancelling a scope cancels all of its children; cancelling a child
/// leaves the parent untouched.
#[derive(Debug, Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

#[derive(Debug)]
struct ScopeInner {
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
    parent: Option<Scope>,
}

impl Scope {
    /// Create a root scope that is only cancelled explicitly.
    pub fn new() -> Self {
        Self::from_parts(CancellationToken::new(), None)
    }

    /// Adopt an existing token. Cancelling the token cancels the scope.
    pub fn from_token(token: CancellationToken) -> Self {
        Self::from_parts(token, None)
    }

    fn from_parts(token: CancellationToken, parent: Option<Scope>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                token,
                reason: OnceLock::new(),
                parent,
            }),
        }
    }

    /// Derive a child scope, cancelled together with this one.
    pub fn child(&self) -> Self {
        Self::from_parts(self.inner.token.child_token(), Some(self.clone()))
    }

    /// Derive a child scope that cancels itself after `timeout`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child scope that cancels itself at `deadline`.
    ///
    /// The timer task exits as soon as the scope is cancelled for any reason.
    /// Must be called from within a tokio runtime.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let scope = self.child();
        let timer = scope.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    debug!("scope deadline exceeded");
                    timer.cancel_with(CancelReason::DeadlineExceeded);
                }
            }
        });
        scope
    }

    /// Cancel this scope and all of its children. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Cancelled);
    }

    fn cancel_with(&self, reason: CancelReason) {
        if !self.inner.token.is_cancelled() {
            let _ = self.inner.reason.set(reason);
        }
        self.inner.token.cancel();
    }

    /// Whether the scope has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once the scope is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// The underlying token, for interop with other tokio-util users.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Why the scope was cancelled, or `None` while it is still live.
    pub fn reason(&self) -> Option<CancelReason> {
        if !self.is_cancelled() {
            return None;
        }
        Some(self.resolve_reason())
    }

    fn resolve_reason(&self) -> CancelReason {
        if let Some(reason) = self.inner.reason.get() {
            return *reason;
        }
        match &self.inner.parent {
            Some(parent) if parent.is_cancelled() => parent.resolve_reason(),
            _ => CancelReason::Cancelled,
        }
    }

    /// The cancellation error, or `None` while the scope is still live.
    pub fn err(&self) -> Option<Error> {
        self.reason().map(Error::from)
    }

    /// The error describing this scope's cancellation, defaulting to
    /// [`Error::Cancelled`] when the scope is still live.
    pub fn cause(&self) -> Error {
        self.err().unwrap_or(Error::Cancelled)
    }

    /// Run `future` until it completes or the scope is cancelled.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(self.cause()),
            output = future => Ok(output),
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl From<CancellationToken> for Scope {
    fn from(token: CancellationToken) -> Self {
        Self::from_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let scope = Scope::new();
        assert!(scope.err().is_none());

        scope.cancel();
        scope.cancel();

        assert!(scope.is_cancelled());
        assert_eq!(scope.reason(), Some(CancelReason::Cancelled));
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let parent = Scope::new();
        let child = parent.child();

        child.cancel();
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert!(other.is_cancelled());
        assert!(matches!(other.err(), Some(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_reports_cause() {
        let root = Scope::new();
        let scope = root.with_timeout(Duration::from_millis(50));
        let child = scope.child();

        scope.cancelled().await;

        assert_eq!(scope.reason(), Some(CancelReason::DeadlineExceeded));
        assert_eq!(child.reason(), Some(CancelReason::DeadlineExceeded));
        assert!(!root.is_cancelled());

        // A late explicit cancel does not rewrite the cause.
        child.cancel();
        assert_eq!(child.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_run_races_cancellation() {
        let scope = Scope::new();
        assert_eq!(scope.run(async { 7 }).await.unwrap(), 7);

        scope.cancel();
        let result = scope.run(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
