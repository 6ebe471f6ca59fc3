//! The event multiplexer and its wake-up plumbing.
//!
//! This module implements the per-thread [`Looper`]: a registration table
//! over a native `epoll` instance, plus the eventfd-backed [`WakeChannel`]
//! used both by the looper itself and by serial executors to turn
//! "something happened on another thread" into readiness.

mod core;
mod event;
mod poller;
mod registration;
mod wake;

pub use self::core::Looper;
pub use event::{CallbackResult, Events, PollOutcome, ReadyEvent};
pub use registration::OnReady;
pub use wake::WakeChannel;
