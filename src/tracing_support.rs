//! Internal logging hooks.
//!
//! The core emits nothing unless the `tracing` feature is enabled. These
//! macros forward to `tracing` when it is, and expand to nothing otherwise.

#[cfg(feature = "tracing")]
macro_rules! debug {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "tributary", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "tracing")]
macro_rules! trace {
    ($($arg:tt)*) => {
        ::tracing::trace!(target: "tributary", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

pub(crate) use debug;
pub(crate) use trace;
