use super::JoinHandle;
use super::state::{CANCELLED, COMPLETED, IDLE, NOTIFIED, QUEUED, RUNNING};
use crate::error::Result;
use crate::runtime::executor::core::ExecutorShared;
use crate::runtime::job::Job;

use log::trace;
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A future driven by a serial executor.
///
/// Each time the task is woken it is enqueued as a job on its executor, so
/// every poll happens on the looper thread and interleaves with other jobs
/// in FIFO order.
pub(crate) struct Task<T> {
    /// The underlying future. Cleared once it completes.
    ///
    /// Only touched while the state is `RUNNING`, which a single job can
    /// hold at a time.
    future: UnsafeCell<Option<BoxFuture<T>>>,

    /// Output of the future, taken by the `JoinHandle`.
    pub(crate) result: Mutex<Option<T>>,

    /// Lifecycle state, see [`super::state`].
    pub(crate) state: AtomicUsize,

    /// Executor the task reschedules itself on.
    executor: Weak<ExecutorShared>,

    /// Key of the task in its executor's live-task table.
    id: u64,

    /// Wakers of `JoinHandle`s awaiting this task.
    pub(crate) waiters: Mutex<Vec<Waker>>,
}

unsafe impl<T: Send> Send for Task<T> {}
unsafe impl<T: Send> Sync for Task<T> {}

impl<T: Send + 'static> Task<T> {
    fn new<F>(future: F, executor: Weak<ExecutorShared>, id: u64) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            future: UnsafeCell::new(Some(Box::pin(future))),
            result: Mutex::new(None),
            state: AtomicUsize::new(QUEUED),
            executor,
            id,
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Polls the future once.
    ///
    /// - `Poll::Pending`: back to `IDLE`, or re-queued if woken meanwhile.
    /// - `Poll::Ready`: stores the result and wakes every waiter.
    pub(crate) fn run(self: Arc<Self>) {
        let current = self.state.load(Ordering::Acquire);

        if current != QUEUED && current != NOTIFIED {
            if current == CANCELLED {
                self.drop_future();
            }
            return;
        }

        if self
            .state
            .compare_exchange(current, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        // Safety: the RUNNING state guarantees no other job is polling.
        let poll = match unsafe { (*self.future.get()).as_mut() } {
            Some(future) => future.as_mut().poll(&mut cx),
            None => return,
        };

        match poll {
            Poll::Pending => self.park(),
            Poll::Ready(value) => self.complete(value),
        }
    }

    fn park(self: Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                NOTIFIED => {
                    self.state.store(QUEUED, Ordering::Release);
                    self.schedule();
                    return;
                }
                // Aborted while running.
                _ => {
                    self.drop_future();
                    return;
                }
            }
        }
    }

    fn complete(&self, value: T) {
        self.drop_future();
        *self.result.lock() = Some(value);

        loop {
            let current = self.state.load(Ordering::Acquire);

            // Aborted while running: the value is discarded.
            if current == CANCELLED {
                self.result.lock().take();
                break;
            }

            if self
                .state
                .compare_exchange(current, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        self.untrack();
        self.notify_waiters();
    }

    /// Enqueues the task on its executor. Cancels it if the executor is gone
    /// or closed.
    fn schedule(self: Arc<Self>) {
        let Some(executor) = self.executor.upgrade() else {
            self.cancel();
            return;
        };

        // A rejected job cancels the task from its destructor.
        if executor.enqueue(Box::new(TaskJob::new(self))).is_err() {
            trace!("task woken after executor shutdown");
        }
    }

    /// Signals the task to be rescheduled.
    ///
    /// If the task is `IDLE`, it moves to `QUEUED` and is enqueued.
    /// If the task is `RUNNING`, it moves to `NOTIFIED` to ensure it is
    /// re-polled right after the current poll.
    pub(crate) fn wake(self: Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.schedule();
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }
}

impl<T> Task<T> {
    /// Moves the task to `CANCELLED` and notifies waiters.
    ///
    /// A task that is already running finishes its current poll first. An
    /// idle task has its future dropped right away, on the calling thread.
    pub(crate) fn cancel(&self) {
        loop {
            let state = self.state.load(Ordering::Acquire);

            if state == COMPLETED || state == CANCELLED {
                return;
            }

            if self
                .state
                .compare_exchange(state, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // No job is queued for an idle task and none can be
                // queued once it is cancelled.
                if state == IDLE {
                    self.drop_future();
                }

                self.untrack();
                self.notify_waiters();
                return;
            }
        }
    }

    fn drop_future(&self) {
        // Safety: callers hold the task in a state no job can poll from:
        // `RUNNING` on the looper thread, or `CANCELLED` reached from `IDLE`.
        unsafe { (*self.future.get()).take() };
    }

    fn untrack(&self) {
        if let Some(executor) = self.executor.upgrade() {
            executor.untrack_task(self.id);
        }
    }

    fn notify_waiters(&self) {
        let waiters = std::mem::take(&mut *self.waiters.lock());
        for waiter in waiters {
            waiter.wake();
        }
    }
}

/// Cancellation seen through the executor's live-task table.
pub(crate) trait Cancel: Send + Sync {
    fn cancel(&self);
}

impl<T: Send> Cancel for Task<T> {
    fn cancel(&self) {
        Task::cancel(self);
    }
}

/// The job that polls a task once.
///
/// Dropping it without running it, as executor teardown does, cancels the
/// task so its `JoinHandle` resolves.
struct TaskJob<T> {
    task: Option<Arc<Task<T>>>,
}

impl<T> TaskJob<T> {
    fn new(task: Arc<Task<T>>) -> Self {
        Self { task: Some(task) }
    }
}

impl<T: Send + 'static> Job for TaskJob<T> {
    fn run(mut self: Box<Self>) {
        if let Some(task) = self.task.take() {
            task.run();
        }
    }
}

impl<T> Drop for TaskJob<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }
}

/// Spawns `future` on the executor behind `shared`.
pub(crate) fn spawn_on<F, T>(shared: &Arc<ExecutorShared>, future: F) -> Result<JoinHandle<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let id = shared.next_task_id();
    let task = Arc::new(Task::new(future, Arc::downgrade(shared), id));
    let weak: Weak<dyn Cancel> = Arc::downgrade(&task) as Weak<Task<T>>;
    shared.track_task(id, weak);

    // On rejection the job's destructor cancels and untracks the task.
    shared.enqueue(Box::new(TaskJob::new(task.clone())))?;

    Ok(JoinHandle { task })
}
