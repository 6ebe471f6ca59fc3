//! Linux `epoll`-based poller implementation.
//!
//! This is the native readiness primitive behind every [`Looper`]. Android's
//! `ALooper` is built on the same system calls, so the backend is shared by
//! both targets.
//!
//! Responsibilities:
//! - Register and deregister file descriptors under a 64-bit token
//! - Block waiting for readiness, with an optional timeout
//!
//! All methods take `&self`: the epoll descriptor may be modified from any
//! thread while the owning thread is blocked in [`EpollPoller::poll`].
//!
//! [`Looper`]: crate::Looper

use crate::reactor::event::{Event, Events};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Linux `epoll` poller.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor, closed when the poller drops.
    epoll: OwnedFd,
}

impl EpollPoller {
    /// Creates a new epoll instance.
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll: unsafe { OwnedFd::from_raw_fd(epoll) },
        })
    }

    /// Registers a file descriptor under `token`.
    ///
    /// Fails with `EEXIST` if the descriptor is already part of this
    /// epoll set.
    pub(crate) fn register(&self, fd: RawFd, token: u64, interest: Events) -> io::Result<()> {
        let mut event = epoll_event {
            events: interest.to_epoll(),
            u64: token,
        };

        let rc = unsafe { epoll_ctl(self.epoll.as_raw_fd(), EPOLL_CTL_ADD, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Removes a file descriptor from the poller.
    ///
    /// Once this returns, the kernel will not report the descriptor again.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let rc =
            unsafe { epoll_ctl(self.epoll.as_raw_fd(), EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Polls for readiness events.
    ///
    /// Blocks until at least one descriptor is ready or the timeout
    /// expires (`None` blocks indefinitely). `buffer`'s capacity bounds the
    /// batch size. Ready events are appended to `events`, and the number of
    /// events is returned; `0` means the timeout elapsed.
    ///
    /// A signal interrupting the wait surfaces as
    /// [`io::ErrorKind::Interrupted`].
    pub(crate) fn poll(
        &self,
        buffer: &mut Vec<epoll_event>,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        let timeout_ms = timeout.map_or(-1, timeout_millis);

        buffer.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll.as_raw_fd(),
                buffer.as_mut_ptr(),
                buffer.capacity().min(i32::MAX as usize) as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        unsafe {
            buffer.set_len(n as usize);
        }

        events.extend(buffer.iter().map(|ev| Event {
            token: ev.u64,
            events: Events::from_epoll(ev.events),
        }));

        Ok(n as usize)
    }
}

/// Converts a timeout to whole milliseconds, rounding up so that a
/// sub-millisecond timeout never degenerates into a busy poll.
fn timeout_millis(timeout: Duration) -> i32 {
    let mut millis = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }

    millis.min(i32::MAX as u128) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_rounds_up_to_next_millisecond() {
        assert_eq!(timeout_millis(Duration::from_micros(1)), 1);
        assert_eq!(timeout_millis(Duration::from_millis(5)), 5);
        assert_eq!(timeout_millis(Duration::from_micros(5_500)), 6);
        assert_eq!(timeout_millis(Duration::ZERO), 0);
    }

    #[test]
    fn huge_timeout_is_clamped() {
        assert_eq!(timeout_millis(Duration::from_secs(u64::MAX)), i32::MAX);
    }
}
