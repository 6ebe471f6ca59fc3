use crate::runtime::task::Task;

use std::sync::Arc;
use std::task::Wake;

/// Waking a task enqueues it on its serial executor.
///
/// Wakers may be used from any thread; the poll itself always happens on
/// the looper thread.
impl<T: Send + 'static> Wake for Task<T> {
    fn wake(self: Arc<Self>) {
        Task::wake(self);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        Task::wake(self.clone());
    }
}
