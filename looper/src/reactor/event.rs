use bitflags::bitflags;
use libc::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT};

use std::os::fd::RawFd;

bitflags! {
    /// Interest and readiness mask for a registered descriptor.
    ///
    /// `ERROR` and `HANGUP` are always reported by the native poller and
    /// never need to be requested.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Events: u32 {
        /// The descriptor is readable.
        const INPUT = 1 << 0;
        /// The descriptor is writable.
        const OUTPUT = 1 << 1;
        /// An error condition is pending on the descriptor.
        const ERROR = 1 << 2;
        /// The peer hung up.
        const HANGUP = 1 << 3;
        /// The descriptor is not open. `epoll` drops closed descriptors
        /// from its set instead of reporting them, so the looper never
        /// produces this flag; it is accepted and ignored in interest masks.
        const INVALID = 1 << 4;
    }
}

impl Events {
    pub(crate) fn to_epoll(self) -> u32 {
        let mut flags = 0;

        if self.contains(Events::INPUT) {
            flags |= EPOLLIN;
        }
        if self.contains(Events::OUTPUT) {
            flags |= EPOLLOUT;
        }

        flags as u32
    }

    pub(crate) fn from_epoll(flags: u32) -> Self {
        let mut events = Events::empty();

        if flags & EPOLLIN as u32 != 0 {
            events |= Events::INPUT;
        }
        if flags & EPOLLOUT as u32 != 0 {
            events |= Events::OUTPUT;
        }
        if flags & EPOLLERR as u32 != 0 {
            events |= Events::ERROR;
        }
        if flags & EPOLLHUP as u32 != 0 {
            events |= Events::HANGUP;
        }

        events
    }
}

/// A readiness notification produced by the poller.
///
/// The token is the registration sequence number stored as epoll user data,
/// or the reserved wake token.
pub(crate) struct Event {
    pub(crate) token: u64,
    pub(crate) events: Events,
}

/// Readiness of a descriptor registered without a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    /// Identifier supplied at registration.
    pub ident: i32,
    /// The ready descriptor.
    pub fd: RawFd,
    /// What the descriptor is ready for.
    pub events: Events,
}

/// Result of a single [`Looper::poll_once`](crate::Looper::poll_once) call.
///
/// A native polling failure is reported as `Err(LooperError::Poll)` instead
/// of a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The looper was woken explicitly, with no associated event.
    Woken,
    /// One or more callbacks were invoked.
    CallbackHandled,
    /// The timeout elapsed before anything became ready.
    TimedOut,
    /// A descriptor registered without a callback became ready.
    Ready(ReadyEvent),
}

/// What the looper should do with a registration after its callback ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    /// Keep the registration and keep delivering events.
    Keep,
    /// Remove the registration, as if `remove(fd)` had been called.
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_never_requests_error_or_hangup() {
        let flags = (Events::INPUT | Events::ERROR | Events::HANGUP).to_epoll();
        assert_eq!(flags, EPOLLIN as u32);
    }

    #[test]
    fn invalid_is_neither_requested_nor_reported() {
        assert_eq!((Events::INPUT | Events::INVALID).to_epoll(), EPOLLIN as u32);

        let everything = Events::from_epoll(u32::MAX);
        assert!(!everything.contains(Events::INVALID));
        assert!(everything.contains(Events::INPUT | Events::OUTPUT | Events::ERROR | Events::HANGUP));
    }

    #[test]
    fn readiness_reports_error_and_hangup() {
        let events = Events::from_epoll((EPOLLOUT | EPOLLERR | EPOLLHUP) as u32);
        assert_eq!(events, Events::OUTPUT | Events::ERROR | Events::HANGUP);
    }
}
