/// Task is idle and not scheduled.
///
/// The task is waiting for its waker to fire.
pub(crate) const IDLE: usize = 0;

/// Task has a job in the executor's queue.
pub(crate) const QUEUED: usize = 1;

/// Task is being polled on the looper thread.
pub(crate) const RUNNING: usize = 2;

/// Task has completed execution.
///
/// The future has returned `Poll::Ready` and will not be polled again.
pub(crate) const COMPLETED: usize = 3;

/// Task was woken while running and must be queued again once the
/// current poll returns.
pub(crate) const NOTIFIED: usize = 4;

/// Task was aborted, or its job was discarded by executor teardown.
pub(crate) const CANCELLED: usize = 5;
