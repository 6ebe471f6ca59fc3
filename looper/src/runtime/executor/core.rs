use crate::error::{LooperError, Result};
use crate::reactor::{CallbackResult, Events, Looper, OnReady, WakeChannel};
use crate::runtime::executor::queue::JobQueue;
use crate::runtime::job::Job;
use crate::runtime::task::{self, Cancel, JoinHandle};

use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::mem;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Executor that runs jobs one at a time, in submission order, on the
/// thread that owns a [`Looper`].
///
/// Producers on any thread call [`enqueue`](Self::enqueue): the job is
/// appended to the queue and then the executor's wake channel is signalled.
/// The looper dispatches that readiness to the executor's drain callback
/// from inside [`Looper::poll_once`], where queued jobs run synchronously.
///
/// The handle is cheap to clone. The drain callback only holds a weak
/// reference, so dropping the last handle tears the executor down as if
/// [`shutdown`](Self::shutdown) had been called.
#[derive(Clone)]
pub struct SerialExecutor {
    shared: Arc<ExecutorShared>,
}

pub(crate) struct ExecutorShared {
    queue: JobQueue,

    /// Looper registration and wake channel. `None` once torn down.
    binding: RwLock<Option<Binding>>,

    /// Spawned tasks that have neither completed nor been cancelled.
    tasks: Mutex<HashMap<u64, Weak<dyn Cancel>>>,

    next_task: AtomicU64,
}

struct Binding {
    looper: Looper,
    wake: WakeChannel,
}

/// The drain callback installed on the looper for the wake channel.
struct DrainOnReady {
    shared: Weak<ExecutorShared>,
}

impl OnReady for DrainOnReady {
    fn on_ready(&self, _fd: RawFd, _events: Events) -> CallbackResult {
        let Some(shared) = self.shared.upgrade() else {
            return CallbackResult::Remove;
        };

        match shared.drain() {
            Ok(ran) => trace!("drained {ran} jobs"),
            Err(err) => panic!("serial executor wake channel is broken: {err}"),
        }

        CallbackResult::Keep
    }
}

impl SerialExecutor {
    /// Attaches a new executor to `looper`.
    ///
    /// # Errors
    ///
    /// [`LooperError::WakeChannel`] if the eventfd cannot be created, or the
    /// [`LooperError::AddFailure`] returned by the looper.
    pub fn new(looper: &Looper) -> Result<Self> {
        let wake = WakeChannel::new().map_err(LooperError::WakeChannel)?;
        let fd = wake.as_raw_fd();

        let shared = Arc::new(ExecutorShared {
            queue: JobQueue::new(),
            binding: RwLock::new(Some(Binding {
                looper: looper.clone(),
                wake,
            })),
            tasks: Mutex::new(HashMap::new()),
            next_task: AtomicU64::new(0),
        });

        let callback = Arc::new(DrainOnReady {
            shared: Arc::downgrade(&shared),
        });

        // On failure `shared` drops here and closes the eventfd.
        looper.add(fd, 0, Events::INPUT, Some(callback))?;

        debug!("serial executor attached with wake fd {fd}");

        Ok(Self { shared })
    }

    /// Attaches a new executor to the calling thread's looper.
    ///
    /// # Errors
    ///
    /// [`LooperError::NotPrepared`] if the thread has no looper, otherwise as
    /// [`new`](Self::new).
    pub fn for_current_thread() -> Result<Self> {
        let looper = Looper::for_thread().ok_or(LooperError::NotPrepared)?;
        Self::new(&looper)
    }

    /// Queues `job` to run on the looper's thread. Never blocks on the
    /// looper.
    ///
    /// # Errors
    ///
    /// [`LooperError::ExecutorClosed`] after shutdown; the job is dropped
    /// without running.
    ///
    /// # Panics
    ///
    /// Panics if the wake channel cannot be signalled, which means the
    /// eventfd is saturated or corrupted.
    pub fn enqueue<J: Job>(&self, job: J) -> Result<()> {
        self.shared.enqueue(Box::new(job))
    }

    /// Runs queued jobs on the calling thread, as the looper callback does.
    ///
    /// Returns the number of jobs that ran.
    ///
    /// # Errors
    ///
    /// [`LooperError::WrongThread`] unless called from the looper's thread.
    /// [`LooperError::WakeChannel`] if the signal count cannot be read.
    pub fn drain(&self) -> Result<usize> {
        if let Some(looper) = self.looper() {
            looper.ensure_owner()?;
        }

        self.shared.drain()
    }

    /// Spawns a future whose every poll happens on the looper's thread.
    ///
    /// The task's waker re-enqueues it as a job, so it interleaves with
    /// other jobs in FIFO order.
    ///
    /// # Errors
    ///
    /// [`LooperError::ExecutorClosed`] after shutdown.
    pub fn spawn<F, T>(&self, future: F) -> Result<JoinHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        task::spawn_on(&self.shared, future)
    }

    /// Tears the executor down.
    ///
    /// The wake channel is deregistered from the looper first, then the
    /// looper reference is released, then the channel is closed. Jobs still
    /// queued are dropped without running, and every unfinished task is
    /// cancelled so its [`JoinHandle`] resolves. Later calls to `enqueue`
    /// fail with [`LooperError::ExecutorClosed`]. Calling this again is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// The [`LooperError::RemoveFailure`] from the looper, if any. Every
    /// resource is released even then.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.shutdown()
    }

    /// Returns `true` once the executor has been shut down.
    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Number of jobs waiting to run.
    pub fn pending_jobs(&self) -> usize {
        self.shared.queue.len()
    }

    /// The looper this executor is attached to, until shutdown.
    pub fn looper(&self) -> Option<Looper> {
        self.shared
            .binding
            .read()
            .as_ref()
            .map(|binding| binding.looper.clone())
    }

    /// Returns `true` if both handles refer to the same executor.
    pub fn ptr_eq(this: &SerialExecutor, other: &SerialExecutor) -> bool {
        Arc::ptr_eq(&this.shared, &other.shared)
    }
}

impl ExecutorShared {
    /// Appends `job`, then signals the wake channel.
    ///
    /// Appending before signalling guarantees a drain that observes the
    /// signal also observes the job.
    pub(crate) fn enqueue(&self, job: Box<dyn Job>) -> Result<()> {
        // A rejected job is dropped only after the lock is released: its
        // destructor may enqueue again.
        let rejected = {
            let binding = self.binding.read();

            match binding.as_ref() {
                None => Some(job),
                Some(binding) => match self.queue.append(job) {
                    Ok(()) => {
                        if let Err(err) = binding.wake.signal() {
                            panic!("serial executor wake channel is broken: {err}");
                        }
                        None
                    }
                    Err(job) => Some(job),
                },
            }
        };

        match rejected {
            Some(job) => {
                drop(job);
                Err(LooperError::ExecutorClosed)
            }
            None => Ok(()),
        }
    }

    /// Reads the signal count and runs up to that many jobs.
    ///
    /// Stops early when the queue runs dry: surplus counts come from
    /// overlapping enqueues and are discarded.
    fn drain(&self) -> Result<usize> {
        let signalled = match self.binding.read().as_ref() {
            Some(binding) => binding.wake.drain_count()?,
            None => return Ok(0),
        };

        let mut ran = 0;
        while (ran as u64) < signalled {
            let Some(job) = self.queue.pop_front() else {
                break;
            };

            job.run();
            ran += 1;
        }

        Ok(ran)
    }

    pub(crate) fn next_task_id(&self) -> u64 {
        self.next_task.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn track_task(&self, id: u64, task: Weak<dyn Cancel>) {
        self.tasks.lock().insert(id, task);
    }

    pub(crate) fn untrack_task(&self, id: u64) {
        self.tasks.lock().remove(&id);
    }

    fn shutdown(&self) -> Result<()> {
        let discarded = self.queue.close();
        let binding = self.binding.write().take();

        let removed = match binding {
            Some(Binding { looper, wake }) => {
                let removed = looper.remove(wake.as_raw_fd());
                drop(looper);
                drop(wake);

                debug!(
                    "serial executor shut down, discarding {} queued jobs",
                    discarded.len()
                );
                removed.map(|_| ())
            }
            None => Ok(()),
        };

        // Queued task jobs cancel their task when dropped.
        drop(discarded);

        // Cancelling wakes join handles, which may enqueue and be rejected:
        // no lock is held here.
        let tasks = mem::take(&mut *self.tasks.lock());
        if !tasks.is_empty() {
            trace!("cancelling {} unfinished tasks", tasks.len());
        }
        for task in tasks.into_values().filter_map(|task| task.upgrade()) {
            task.cancel();
        }

        removed
    }
}

impl Drop for ExecutorShared {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("serial executor teardown failed: {err}");
        }
    }
}

impl fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialExecutor")
            .field("closed", &self.is_closed())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}
