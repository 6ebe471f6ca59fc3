use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A future that yields back to the serial queue exactly once.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.0 {
            self.0 = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        Poll::Ready(())
    }
}

/// Yields to the serial executor.
///
/// The task is re-enqueued behind every job already queued, so those jobs
/// run before it continues.
///
/// # Examples
///
/// ```rust,ignore
/// executor.spawn(async {
///     step_one();
///     yield_now().await;
///     step_two();
/// })?;
/// ```
pub async fn yield_now() {
    YieldOnce(false).await
}
