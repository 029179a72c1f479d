//! Error types for pools, pipelines and their collaborators.

use std::sync::Arc;

use crate::scope::CancelReason;

/// The main error type for the crate.
///
/// Streaming components never surface per-item errors (failed items are
/// dropped), so this type mostly travels through [`map_concurrent`],
/// the retry helpers and the circuit breaker.
///
/// [`map_concurrent`]: crate::concurrent_map::map_concurrent
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The governing scope was cancelled
    #[error("operation was cancelled")]
    Cancelled,

    /// The governing scope ran past its deadline
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A user-supplied processing function failed
    #[error("processing failed: {0}")]
    Processor(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// An operation timed out
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The circuit breaker rejected the call
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// An error tagged with an explicit retry decision
    #[error("{source}")]
    Classified { source: Arc<Error>, retryable: bool },

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Create a processor error from any error type
    pub fn processor<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Processor(Arc::new(error))
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Error::Timeout { duration_ms }
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Mark an error as worth retrying.
    pub fn retryable(error: impl Into<Error>) -> Self {
        Error::Classified {
            source: Arc::new(error.into()),
            retryable: true,
        }
    }

    /// Mark an error as final; retry helpers give up on it immediately.
    pub fn permanent(error: impl Into<Error>) -> Self {
        Error::Classified {
            source: Arc::new(error.into()),
            retryable: false,
        }
    }

    /// Whether a retry helper should try again after this error.
    ///
    /// Tagged errors answer with their tag. Cancellation and deadline errors
    /// are never retryable; every other error is.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Classified { retryable, .. } => *retryable,
            Error::Cancelled | Error::DeadlineExceeded => false,
            _ => true,
        }
    }

    /// Whether this error reports a cancelled or expired scope.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Error::Cancelled | Error::DeadlineExceeded => true,
            Error::Classified { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}

impl From<CancelReason> for Error {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => Error::Cancelled,
            CancelReason::DeadlineExceeded => Error::DeadlineExceeded,
        }
    }
}

// Common conversions
impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::custom(format!("Task panicked: {}", err))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::Custom(format!("Timeout: {}", e))
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Processor(Arc::from(e))
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for converting foreign results into our Error type
pub trait IntoError<T> {
    fn into_processor_error(self) -> Result<T>;
    fn into_retryable_error(self) -> Result<T>;
    fn into_permanent_error(self) -> Result<T>;
}

impl<T, E> IntoError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_processor_error(self) -> Result<T> {
        self.map_err(Error::processor)
    }

    fn into_retryable_error(self) -> Result<T> {
        self.map_err(|e| Error::retryable(Error::processor(e)))
    }

    fn into_permanent_error(self) -> Result<T> {
        self.map_err(|e| Error::permanent(Error::processor(e)))
    }
}
