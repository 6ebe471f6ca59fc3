use crate::error::{LooperError, Result};
use crate::runtime::task::Task;
use crate::runtime::task::state::{CANCELLED, COMPLETED};

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll};

/// A handle to a task spawned on a serial executor.
///
/// `JoinHandle` implements [`Future`] and resolves once the task has
/// completed, or with [`LooperError::TaskCancelled`] if it was aborted or
/// discarded by executor shutdown. It may be awaited from any thread.
///
/// Dropping the `JoinHandle` does **not** cancel the task; it only
/// discards the ability to observe its result.
pub struct JoinHandle<T> {
    /// Shared reference to the underlying task.
    pub(crate) task: Arc<Task<T>>,
}

impl<T> JoinHandle<T> {
    /// Returns `true` once the task has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        matches!(self.task.state.load(Ordering::Acquire), COMPLETED | CANCELLED)
    }

    /// Cancels the task.
    ///
    /// A task that is not running will never be polled again. A task that
    /// is being polled finishes that poll and then stops; its value, if
    /// any, is discarded.
    pub fn abort(&self) {
        self.task.cancel();
    }

    /// Takes the outcome if the task has finished.
    ///
    /// # Panics
    ///
    /// Panics if the result was already taken.
    pub(crate) fn try_take(&mut self) -> Option<Result<T>> {
        match self.task.state.load(Ordering::Acquire) {
            COMPLETED => {
                let value = self
                    .task
                    .result
                    .lock()
                    .take()
                    .expect("JoinHandle polled after completion");
                Some(Ok(value))
            }
            CANCELLED => Some(Err(LooperError::TaskCancelled)),
            _ => None,
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T>;

    /// The waker is registered **before** re-checking the task state
    /// to avoid missed wake-ups.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(outcome) = this.try_take() {
            return Poll::Ready(outcome);
        }

        this.task.waiters.lock().push(cx.waker().clone());

        match this.try_take() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}
