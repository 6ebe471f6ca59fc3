/// A unit of work run exactly once by a serial executor.
///
/// Every `FnOnce() + Send + 'static` closure is a `Job`. Ownership moves to
/// the executor's queue on enqueue and to the running thread on dequeue; a
/// job that is still queued when the executor shuts down is dropped without
/// being run.
pub trait Job: Send + 'static {
    /// Consumes and runs the job.
    fn run(self: Box<Self>);
}

impl<F> Job for F
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (*self)()
    }
}
