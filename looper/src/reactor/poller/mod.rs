//! Platform-specific I/O poller abstraction.
//!
//! The concrete implementation is selected at compile time. Only
//! `epoll` (Linux and Android) is supported.

#[cfg(not(any(target_os = "linux", target_os = "android")))]
compile_error!("looper requires epoll(7) and eventfd(2): only Linux and Android are supported.");

mod epoll;

pub(crate) mod unix;

pub(crate) type Poller = epoll::EpollPoller;

pub(crate) use unix as platform;
