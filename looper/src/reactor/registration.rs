use crate::reactor::event::{CallbackResult, Events};

use std::collections::HashMap;
use std::os::fd::RawFd;
use std::sync::Arc;

/// Capability invoked by the looper when a registered descriptor is ready.
///
/// Callbacks run on the looper's owning thread, from inside
/// [`Looper::poll_once`](crate::Looper::poll_once), with no looper lock
/// held. They may add or remove registrations, including their own.
pub trait OnReady: Send + Sync {
    fn on_ready(&self, fd: RawFd, events: Events) -> CallbackResult;
}

impl<F> OnReady for F
where
    F: Fn(RawFd, Events) -> CallbackResult + Send + Sync,
{
    fn on_ready(&self, fd: RawFd, events: Events) -> CallbackResult {
        self(fd, events)
    }
}

pub(crate) struct Registration {
    pub(crate) fd: RawFd,
    pub(crate) ident: i32,
    pub(crate) callback: Option<Arc<dyn OnReady>>,
}

/// Registration table of a looper.
///
/// Entries are keyed by a sequence number that is never reused; that number
/// is what the poller carries as user data, so an event collected for a
/// registration that has since been removed cannot be attributed to a newer
/// registration of the same descriptor.
pub(crate) struct Registry {
    entries: HashMap<u64, Registration>,
    by_fd: HashMap<RawFd, u64>,
    next_seq: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_fd: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Returns the sequence number the next insertion will use.
    ///
    /// `u64::MAX` is reserved for the looper's own wake channel.
    pub(crate) fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub(crate) fn insert(&mut self, seq: u64, registration: Registration) {
        debug_assert_eq!(seq, self.next_seq);
        debug_assert!(!self.by_fd.contains_key(&registration.fd));

        self.next_seq += 1;
        self.by_fd.insert(registration.fd, seq);
        self.entries.insert(seq, registration);
    }

    pub(crate) fn seq_of(&self, fd: RawFd) -> Option<u64> {
        self.by_fd.get(&fd).copied()
    }

    pub(crate) fn get(&self, seq: u64) -> Option<&Registration> {
        self.entries.get(&seq)
    }

    pub(crate) fn contains(&self, seq: u64) -> bool {
        self.entries.contains_key(&seq)
    }

    pub(crate) fn remove(&mut self, seq: u64) -> Option<Registration> {
        let registration = self.entries.remove(&seq)?;
        self.by_fd.remove(&registration.fd);

        Some(registration)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
