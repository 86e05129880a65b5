//! A fan-out multiplexer for a single upstream channel.
//!
//! A [`Broadcaster`] wraps one `tokio::sync::mpsc::Receiver<T>` and lets an
//! arbitrary, changing-over-time number of listeners subscribe to the values
//! it produces, each at their own pace: a listener that can't currently keep
//! up with the broadcaster simply falls behind on its own unbounded buffer
//! chain rather than blocking the broadcaster or other listeners.
//!
//! [`Controller`] bundles a `Broadcaster` together with an owned ingress
//! channel for callers who don't already have an upstream channel lying
//! around. [`converge2`]/[`converge3`]/[`converge_n`]/[`converge_dyn`] do the
//! opposite: merge several receivers into one.
//!
//! The engine itself is a single task, spawned lazily on first use, which
//! drives the registry of listeners one generation at a time: fan out a wait
//! fragment per listener, race them against the next upstream value (or
//! subscribe/detach request), then bound the fragments with a barrier once a
//! winner is known.

mod buffer;
mod config;
mod controller;
mod convenience;
mod convergence;
mod engine;
mod error;
mod fragment;
mod handle;
mod listener;
mod pool;
mod registry;
mod signal;

pub use config::PoolConfig;
pub use controller::Controller;
pub use convergence::{converge2, converge3, converge_dyn, converge_n, Converged2, Converged3, ErasedSource};
pub use error::ConvergeError;
pub use handle::Broadcaster;
pub use listener::CancelHandle;
pub use pool::init_pool;
