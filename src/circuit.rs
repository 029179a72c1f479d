//! A circuit breaker for calls to an unreliable dependency.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::tracing_support::debug;

/// The breaker's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected until the reset timeout passes
    Open,
    /// A single probe call is admitted to test the dependency
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(name)
    }
}

/// Trips open after `failure_threshold` consecutive failures and rejects
/// calls with [`Error::CircuitOpen`] until `reset_timeout` has passed since
/// the last failure.
///
/// After the timeout the breaker is half-open: one probe call at a time is
/// let through. A successful probe closes the breaker; a failed one opens
/// it again.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: usize,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

#[derive(Debug)]
struct BreakerState {
    position: CircuitState,
    failures: usize,
    last_failure: Option<Instant>,
    probing: bool,
}

impl CircuitBreaker {
    /// Create a closed breaker. A zero threshold is treated as one.
    pub fn new(failure_threshold: usize, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState {
                position: CircuitState::Closed,
                failures: 0,
                last_failure: None,
                probing: false,
            }),
        }
    }

    /// Run `op` through the breaker.
    ///
    /// Fails with the scope's cause if `scope` is already cancelled, and with
    /// [`Error::CircuitOpen`] if the breaker rejects the call. Otherwise the
    /// outcome of `op` is recorded and returned.
    pub async fn call<F, Fut, T>(&self, scope: &Scope, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(error) = scope.err() {
            return Err(error);
        }

        let mut probe = self.admit()?;
        let result = op().await;
        probe.settle(result.is_ok());
        result
    }

    fn admit(&self) -> Result<Probe<'_>> {
        let mut state = self.state.lock();
        let is_probe = match state.position {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = state
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.reset_timeout);
                if !cooled {
                    return Err(Error::CircuitOpen);
                }
                debug!("circuit half-open, admitting probe");
                state.position = CircuitState::HalfOpen;
                true
            }
            CircuitState::HalfOpen => {
                if state.probing {
                    return Err(Error::CircuitOpen);
                }
                true
            }
        };
        if is_probe {
            state.probing = true;
        }
        Ok(Probe {
            breaker: self,
            is_probe,
            settled: false,
        })
    }

    fn record(&self, success: bool, is_probe: bool) {
        let mut state = self.state.lock();
        if is_probe {
            state.probing = false;
        }
        if success {
            state.failures = 0;
            state.position = CircuitState::Closed;
            return;
        }

        state.failures += 1;
        state.last_failure = Some(Instant::now());
        if is_probe || state.failures >= self.failure_threshold {
            if state.position != CircuitState::Open {
                debug!(failures = state.failures, "circuit opened");
            }
            state.position = CircuitState::Open;
        }
    }

    /// The current position. An open breaker whose timeout has passed still
    /// reports `Open` until the next call probes it.
    pub fn state(&self) -> CircuitState {
        self.state.lock().position
    }

    /// Consecutive failures recorded since the last success.
    pub fn failures(&self) -> usize {
        self.state.lock().failures
    }

    /// Force the breaker closed and forget past failures.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.position = CircuitState::Closed;
        state.failures = 0;
        state.last_failure = None;
        state.probing = false;
    }
}

/// An admitted call. Dropping it unsettled frees the probe slot so a
/// cancelled probe cannot wedge the breaker half-open.
struct Probe<'a> {
    breaker: &'a CircuitBreaker,
    is_probe: bool,
    settled: bool,
}

impl Probe<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker.record(success, self.is_probe);
    }
}

impl Drop for Probe<'_> {
    fn drop(&mut self) {
        if self.is_probe && !self.settled {
            self.breaker.state.lock().probing = false;
        }
    }
}
