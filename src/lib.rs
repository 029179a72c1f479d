//! # Composable concurrency primitives for tokio
//!
//! This crate provides worker pools, stage pipelines, fan-out/fan-in and a
//! bounded concurrent map, all built on closable typed streams and a shared
//! cancellation scope.
//!
//! ## Core Concepts
//!
//! - **Stream**: a bounded, closable conduit ([`stream::channel`])
//! - **Scope**: the cancellation context every task runs under ([`Scope`])
//! - **Pool**: a fixed set of workers draining one stream into another
//! - **Stage**: a stream-to-stream transformation; stages chain into a
//!   **Pipeline**
//! - **Fan**: spreading a stream over workers and merging the results
//!
//! Every send and receive races against the scope, so cancelling a scope
//! stops every task started under it, and every output stream closes exactly
//! once, after the last task that could write to it has exited.
//!
//! ## Example
//!
//! ```rust
//! use tributary::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let scope = Scope::new();
//!     let squares = Pool::new(4, |_scope, x: u64| async move { Ok(x * x) });
//!
//!     let pipeline = Pipeline::builder(&scope)
//!         .stage(squares)
//!         .stage(filter(|x: &u64| x % 2 == 0))
//!         .build();
//!
//!     let mut evens = collect(pipeline.run(from_iter(&scope, 1..=10))).await;
//!     evens.sort();
//!     assert_eq!(evens, vec![4, 16, 36, 64, 100]);
//! }
//! ```
//!
//! ## Features
//!
//! - `tracing`: emit internal debug and trace events through `tracing`
//! - `metrics`: publish [`Metrics`](metrics::Metrics) counters through the
//!   `metrics` facade
//! - `serde`: derive `Serialize`/`Deserialize` for the [`config`] structs

mod cohort;
mod tracing_support;

pub mod circuit;
pub mod concurrent_map;
pub mod config;
pub mod error;
pub mod fan;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod rate;
pub mod retry;
pub mod scope;
pub mod stages;
pub mod stream;
pub mod util;

// Re-export commonly used items
pub mod prelude {
    pub use crate::circuit::{CircuitBreaker, CircuitState};
    pub use crate::concurrent_map::map_concurrent;
    pub use crate::config::{BackpressureOptions, ContextOptions, PoolOptions, RateLimitOptions};
    pub use crate::error::{Error, IntoError, Result};
    pub use crate::fan::{fan_in, fan_out, fan_out_fan_in, round_robin};
    pub use crate::metrics::Metrics;
    pub use crate::pipeline::{Pipeline, PipelineBuilder};
    pub use crate::pool::Pool;
    pub use crate::rate::{rate_limit, BurstRateLimiter, Limiter, RateLimit, RateLimiter};
    pub use crate::retry::{retry, retry_forever, retry_with_backoff, with_retry, RetryConfig};
    pub use crate::scope::{CancelReason, Scope};
    pub use crate::stages::{
        batch, buffer, filter, map, merge, passthrough, tee, unbatch, Stage, StageExt,
    };
    pub use crate::stream::{channel, unbounded, Receiver, Sender};
    pub use crate::util::{collect, collect_with_timeout, from_fn, from_iter, from_stream};
}

// Re-export main types
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use pool::Pool;
pub use scope::Scope;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
