//! Serial executor implementation.
//!
//! It is composed of:
//! - [`core`]: the executor handle, drain callback, and teardown,
//! - [`queue`]: the lock-guarded FIFO that holds pending jobs.

pub(crate) mod core;
pub(crate) mod queue;
