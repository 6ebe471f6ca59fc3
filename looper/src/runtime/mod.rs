//! Scheduling on top of the looper.
//!
//! This module contains everything that turns a per-thread [`Looper`] into
//! a place other threads can send work to:
//! - the [`Job`] abstraction and the serial executor that runs jobs in FIFO
//!   order on the looper thread,
//! - tasks, which drive futures through that same executor,
//! - the [`MainLoop`] binding that designates one thread as the main thread,
//! - looper configuration and the thread-local looper slot.
//!
//! [`Looper`]: crate::Looper
//! [`Job`]: job::Job
//! [`MainLoop`]: main_loop::MainLoop

mod executor;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod job;
pub(crate) mod main_loop;
pub(crate) mod yield_now;

pub mod task;

pub use executor::core::SerialExecutor;
