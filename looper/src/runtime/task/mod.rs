//! Futures driven by a serial executor.
//!
//! A spawned future is wrapped in a task whose waker enqueues it as a job,
//! so all of its polls run on the looper thread. Most users reach this
//! through [`SerialExecutor::spawn`](crate::SerialExecutor::spawn) and
//! [`MainLoop::block_on`](crate::MainLoop::block_on).

mod core;
mod handle;
mod state;
mod waker;

pub(crate) use self::core::{Cancel, Task, spawn_on};
pub use handle::JoinHandle;
