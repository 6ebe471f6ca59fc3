use crate::runtime::job::Job;

use parking_lot::Mutex;
use std::collections::VecDeque;

/// FIFO of jobs waiting for a serial executor.
///
/// The lock is held only while the container is mutated, never while a job
/// runs. Once closed, the queue refuses new jobs.
pub(crate) struct JobQueue {
    state: Mutex<State>,
}

struct State {
    jobs: VecDeque<Box<dyn Job>>,
    closed: bool,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        JobQueue {
            state: Mutex::new(State {
                jobs: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Appends a job at the back of the queue.
    ///
    /// Hands the job back if the queue has been closed.
    pub(crate) fn append(&self, job: Box<dyn Job>) -> Result<(), Box<dyn Job>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(job);
        }

        state.jobs.push_back(job);
        Ok(())
    }

    /// Removes the oldest job.
    pub(crate) fn pop_front(&self) -> Option<Box<dyn Job>> {
        self.state.lock().jobs.pop_front()
    }

    /// Closes the queue and returns the jobs it still held.
    ///
    /// The caller drops them outside the lock, since dropping a job may
    /// run arbitrary code.
    pub(crate) fn close(&self) -> VecDeque<Box<dyn Job>> {
        let mut state = self.state.lock();
        state.closed = true;

        std::mem::take(&mut state.jobs)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn pops_in_arrival_order() {
        let queue = JobQueue::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = log.clone();
            assert!(queue.append(Box::new(move || log.lock().push(i))).is_ok());
        }

        while let Some(job) = queue.pop_front() {
            job.run();
        }

        assert_eq!(*log.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn closed_queue_rejects_and_discards() {
        let queue = JobQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let counter = ran.clone();
        assert!(
            queue
                .append(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }))
                .is_ok()
        );

        let discarded = queue.close();
        assert_eq!(discarded.len(), 1);
        drop(discarded);

        assert!(queue.is_closed());
        assert!(queue.append(Box::new(|| {})).is_err());
        assert!(queue.pop_front().is_none());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
