//! Bounded worker pool, delayed-call scheduler and per-endpoint HTTP
//! dispatcher for client-side systems that must share a bounded number of
//! remote endpoints and a bounded pool of worker threads.
//!
//! Three cooperating pieces:
//!
//! - [`pool::WorkerPool`]: a named, fixed-capacity pool of lazily spawned,
//!   idle-reaped worker threads.
//! - [`delayed::DelayedCallService`]: a process-wide singleton that fires
//!   callbacks after a delay, with cancellation by identity.
//! - [`dispatch::Dispatcher`]: a process-wide, per-endpoint admission
//!   controller over an HTTP transport, distinguishing short from
//!   long-running requests.
//!
//! None of the three assume a cooperative event loop on the caller's
//! side: submission and completion are expressed through blocking
//! monitors, not futures, even though the dispatcher's transport runs on
//! its own private async runtime internally.

mod endpoint;
mod latch;

pub mod delayed;
pub mod dispatch;
pub mod error;
pub mod invocation;
pub mod log;
pub mod pool;

pub use endpoint::Endpoint;
pub use error::{Error, Kind, Result};
pub use invocation::{ArgValue, Invocation, Selector, Target, TargetHandle};
