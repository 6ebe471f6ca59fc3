use crate::error::{LooperError, Result};
use crate::reactor::{Looper, PollOutcome};
use crate::runtime::builder::LooperOptions;
use crate::runtime::executor::core::SerialExecutor;
use crate::runtime::job::Job;
use crate::runtime::task::JoinHandle;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;

/// The designated main thread's looper and serial executor.
///
/// A `MainLoop` is created once at startup and passed by reference to
/// whatever needs to schedule work on the main thread. It can also live in
/// a `static`, since [`MainLoop::new`] is `const`.
///
/// [`setup`](Self::setup) binds the calling thread and is idempotent: once
/// bound, further calls are no-ops, whichever thread makes them.
/// [`teardown`](Self::teardown) releases the binding; it must be set up
/// again before use.
pub struct MainLoop {
    options: LooperOptions,
    binding: Mutex<Option<Binding>>,
}

struct Binding {
    looper: Looper,
    executor: SerialExecutor,
}

impl MainLoop {
    /// Creates an unbound main loop with default looper options.
    pub const fn new() -> Self {
        Self::with_options(LooperOptions {
            allow_non_callbacks: false,
            event_capacity: crate::runtime::builder::DEFAULT_EVENT_CAPACITY,
        })
    }

    /// Creates an unbound main loop that prepares its looper with `options`.
    pub const fn with_options(options: LooperOptions) -> Self {
        Self {
            options,
            binding: Mutex::new(None),
        }
    }

    /// Binds the calling thread as the main thread.
    ///
    /// Prepares the thread's looper and attaches a serial executor to it.
    /// Does nothing if already set up, even from a different thread: the
    /// original binding is kept.
    ///
    /// # Errors
    ///
    /// [`LooperError::PreparationFailure`] or the executor's
    /// [`LooperError::AddFailure`]; the main loop stays unbound.
    pub fn setup(&self) -> Result<()> {
        let mut binding = self.binding.lock();

        if binding.is_some() {
            debug!("main loop already set up");
            return Ok(());
        }

        let looper = Looper::prepare(self.options)?;
        let executor = SerialExecutor::new(&looper)?;

        debug!("main loop bound to {looper:?}");
        *binding = Some(Binding { looper, executor });

        Ok(())
    }

    /// Returns `true` between `setup` and `teardown`.
    pub fn is_set_up(&self) -> bool {
        self.binding.lock().is_some()
    }

    /// The main thread's looper.
    ///
    /// # Errors
    ///
    /// [`LooperError::MainLoopUnavailable`] unless set up.
    pub fn looper(&self) -> Result<Looper> {
        self.binding
            .lock()
            .as_ref()
            .map(|binding| binding.looper.clone())
            .ok_or(LooperError::MainLoopUnavailable)
    }

    /// The main thread's serial executor.
    ///
    /// # Errors
    ///
    /// [`LooperError::MainLoopUnavailable`] unless set up.
    pub fn executor(&self) -> Result<SerialExecutor> {
        self.binding
            .lock()
            .as_ref()
            .map(|binding| binding.executor.clone())
            .ok_or(LooperError::MainLoopUnavailable)
    }

    /// Queues `job` to run on the main thread.
    ///
    /// # Errors
    ///
    /// [`LooperError::MainLoopUnavailable`] unless set up.
    pub fn enqueue<J: Job>(&self, job: J) -> Result<()> {
        self.executor()?.enqueue(job)
    }

    /// Spawns a future that is polled on the main thread.
    ///
    /// # Errors
    ///
    /// [`LooperError::MainLoopUnavailable`] unless set up.
    pub fn spawn<F, T>(&self, future: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.executor()?.spawn(future)
    }

    /// Runs `future` to completion on the main thread, driving the looper
    /// meanwhile.
    ///
    /// Other jobs and callbacks keep being served while the future is
    /// pending. Ready events of callback-less registrations are skipped.
    ///
    /// # Errors
    ///
    /// [`LooperError::WrongThread`] off the main thread,
    /// [`LooperError::TaskCancelled`] if the main loop is torn down first,
    /// from this thread or any other, or any error from
    /// [`Looper::poll_once`].
    pub fn block_on<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (looper, executor) = {
            let binding = self.binding.lock();
            let binding = binding.as_ref().ok_or(LooperError::MainLoopUnavailable)?;
            (binding.looper.clone(), binding.executor.clone())
        };
        looper.ensure_owner()?;

        let mut handle = executor.spawn(future)?;

        loop {
            if let Some(outcome) = handle.try_take() {
                return outcome;
            }

            if executor.is_closed() {
                debug!("main loop torn down during block_on");
                return Err(LooperError::TaskCancelled);
            }

            match looper.poll_once(None)? {
                PollOutcome::Ready(event) => {
                    warn!("main loop skipped foreground event {event:?}");
                }
                outcome => trace!("main loop poll: {outcome:?}"),
            }
        }
    }

    /// Releases the binding.
    ///
    /// Shuts the executor down, discarding queued jobs and cancelling
    /// unfinished tasks, wakes the looper so a pending
    /// [`block_on`](Self::block_on) returns, then releases the looper
    /// reference. May be called from any thread.
    ///
    /// # Errors
    ///
    /// The executor's shutdown error, if any. The binding is cleared
    /// regardless.
    pub fn teardown(&self) -> Result<()> {
        let Some(Binding { looper, executor }) = self.binding.lock().take() else {
            return Ok(());
        };

        let result = executor.shutdown();
        drop(executor);

        looper.wake();
        drop(looper);

        debug!("main loop torn down");

        result
    }
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLoop")
            .field("options", &self.options)
            .field("set_up", &self.is_set_up())
            .finish()
    }
}
