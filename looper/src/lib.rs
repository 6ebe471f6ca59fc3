//! # Looper
//!
//! **Looper** runs work submitted from any thread one job at a time, in
//! submission order, on a single designated thread that otherwise sits
//! blocked in an `epoll` wait.
//!
//! It is built from a handful of pieces:
//!
//! - [`Looper`]: a per-thread event multiplexer. Descriptors are registered
//!   with an interest mask and an optional [`OnReady`] callback;
//!   [`Looper::poll_once`] blocks until something is ready.
//! - [`WakeChannel`]: an eventfd counter that turns "work was enqueued" into
//!   readiness the looper can wait on.
//! - [`SerialExecutor`]: a FIFO of [`Job`]s drained by the looper thread each
//!   time its wake channel fires. Futures can be spawned on it too.
//! - [`MainLoop`]: binds one thread's looper and executor as the main
//!   thread, with explicit setup and teardown.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use looper::MainLoop;
//! use std::thread;
//!
//! let main_loop = MainLoop::new();
//! main_loop.setup()?;
//!
//! let executor = main_loop.executor()?;
//! thread::spawn(move || {
//!     executor.enqueue(|| println!("runs on the main thread")).unwrap();
//! });
//!
//! loop {
//!     main_loop.looper()?.poll_once(None)?;
//! }
//! ```
//!
//! Or let the macros drive the loop:
//!
//! ```rust,ignore
//! #[looper::main]
//! async fn main() {
//!     looper::yield_now().await;
//! }
//! ```

mod error;
mod reactor;
mod runtime;

pub use error::{LooperError, Result};
pub use reactor::{CallbackResult, Events, Looper, OnReady, PollOutcome, ReadyEvent, WakeChannel};
pub use runtime::SerialExecutor;
pub use runtime::builder::{LooperBuilder, LooperOptions};
pub use runtime::job::Job;
pub use runtime::main_loop::MainLoop;
pub use runtime::task::JoinHandle;
pub use runtime::yield_now::yield_now;

pub use looper_macros::*;
