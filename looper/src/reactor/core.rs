use crate::error::{LooperError, Result};
use crate::reactor::event::{CallbackResult, Event, Events, PollOutcome, ReadyEvent};
use crate::reactor::poller::Poller;
use crate::reactor::registration::{OnReady, Registration, Registry};
use crate::reactor::wake::WakeChannel;
use crate::runtime::builder::LooperOptions;
use crate::runtime::context::{current_looper, with_looper_slot};

use libc::epoll_event;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Reserved token used internally for the looper's own wake channel.
///
/// Registration sequence numbers start at zero and never reach this value.
const WAKE_TOKEN: u64 = u64::MAX;

/// A per-thread event multiplexer.
///
/// A `Looper` blocks its owning thread in [`poll_once`](Self::poll_once)
/// until a registered descriptor is ready, [`wake`](Self::wake) is called,
/// or a timeout elapses. Descriptors registered with a callback are
/// dispatched internally; descriptors registered without one are handed back
/// to the caller as [`PollOutcome::Ready`].
///
/// The handle is reference counted: cloning acquires a reference and
/// dropping releases it. The native descriptors are closed when the last
/// reference goes away. The owning thread's slot keeps one reference for as
/// long as the thread lives.
///
/// Registration and wake-up are safe from any thread. Polling is reserved
/// to the thread that prepared the looper.
#[derive(Clone)]
pub struct Looper {
    inner: Arc<Inner>,
}

struct Inner {
    /// Native readiness primitive.
    poller: Poller,

    /// Wake channel behind [`Looper::wake`], registered under [`WAKE_TOKEN`].
    wake: WakeChannel,

    /// Live registrations.
    registry: Mutex<Registry>,

    /// Ready events of callback-less registrations not yet returned.
    pending: Mutex<VecDeque<ReadyEvent>>,

    /// Reusable buffer for native events. Only locked by the owning thread
    /// for the duration of a wait.
    buffer: Mutex<Vec<epoll_event>>,

    /// Thread allowed to poll.
    owner: ThreadId,

    options: LooperOptions,
}

/// A callback collected from a native event batch, invoked after the
/// registry lock is released.
struct Dispatch {
    seq: u64,
    fd: RawFd,
    events: Events,
    callback: Arc<dyn OnReady>,
}

impl Looper {
    /// Prepares a looper for the calling thread and returns it.
    ///
    /// If the thread already has a looper, that same looper is returned as
    /// long as `options` are compatible with the ones it was prepared with.
    ///
    /// # Errors
    ///
    /// [`LooperError::PreparationFailure`] if the existing looper has
    /// incompatible options or the native resources cannot be created.
    pub fn prepare(options: LooperOptions) -> Result<Looper> {
        with_looper_slot(|slot| {
            if let Some(looper) = slot.as_ref() {
                if !looper.inner.options.is_compatible_with(&options) {
                    warn!(
                        "looper already prepared with {:?}, refusing {:?}",
                        looper.inner.options, options
                    );
                    return Err(LooperError::PreparationFailure(options));
                }
                return Ok(looper.clone());
            }

            let looper = Looper::new(options).map_err(|err| {
                warn!("failed to create looper: {err}");
                LooperError::PreparationFailure(options)
            })?;

            debug!("prepared looper for thread {:?}", looper.inner.owner);
            *slot = Some(looper.clone());

            Ok(looper)
        })
    }

    /// Returns the looper prepared for the calling thread, if any.
    pub fn for_thread() -> Option<Looper> {
        current_looper()
    }

    fn new(options: LooperOptions) -> io::Result<Self> {
        let poller = Poller::new()?;
        let wake = WakeChannel::new()?;
        poller.register(wake.as_raw_fd(), WAKE_TOKEN, Events::INPUT)?;

        Ok(Self {
            inner: Arc::new(Inner {
                poller,
                wake,
                registry: Mutex::new(Registry::new()),
                pending: Mutex::new(VecDeque::new()),
                buffer: Mutex::new(Vec::with_capacity(options.event_capacity.max(1))),
                owner: thread::current().id(),
                options,
            }),
        })
    }

    /// Returns the options this looper was prepared with.
    pub fn options(&self) -> LooperOptions {
        self.inner.options
    }

    /// Returns `true` if both handles refer to the same looper.
    pub fn ptr_eq(this: &Looper, other: &Looper) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Returns `true` when called from the thread that owns this looper.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.inner.owner
    }

    pub(crate) fn ensure_owner(&self) -> Result<()> {
        if self.is_owner_thread() {
            Ok(())
        } else {
            Err(LooperError::WrongThread)
        }
    }

    /// Returns `true` if `fd` is currently registered.
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.inner.registry.lock().seq_of(fd).is_some()
    }

    /// Registers a descriptor.
    ///
    /// With a callback, readiness is dispatched to the callback from inside
    /// [`poll_once`](Self::poll_once) and `ident` is informational. Without
    /// one, readiness is returned as [`PollOutcome::Ready`] carrying `ident`.
    ///
    /// # Errors
    ///
    /// [`LooperError::AddFailure`] if the descriptor is already registered,
    /// if no callback is given on a looper that does not allow that, if a
    /// callback-less registration has a negative `ident`, or if the native
    /// registration fails.
    pub fn add(
        &self,
        fd: RawFd,
        ident: i32,
        events: Events,
        callback: Option<Arc<dyn OnReady>>,
    ) -> Result<()> {
        if callback.is_none() {
            if !self.inner.options.allow_non_callbacks {
                return Err(LooperError::add_failure(
                    fd,
                    io::ErrorKind::InvalidInput,
                    "looper does not allow registrations without a callback",
                ));
            }
            if ident < 0 {
                return Err(LooperError::add_failure(
                    fd,
                    io::ErrorKind::InvalidInput,
                    "identifier must be non-negative without a callback",
                ));
            }
        }

        let mut registry = self.inner.registry.lock();

        if registry.seq_of(fd).is_some() {
            return Err(LooperError::add_failure(
                fd,
                io::ErrorKind::AlreadyExists,
                "descriptor is already registered",
            ));
        }

        let seq = registry.next_seq();
        self.inner
            .poller
            .register(fd, seq, events)
            .map_err(|source| LooperError::AddFailure { fd, source })?;

        registry.insert(
            seq,
            Registration {
                fd,
                ident,
                callback,
            },
        );
        trace!("registered fd {fd} as #{seq} for {events:?}");

        Ok(())
    }

    /// Registers a descriptor whose readiness is handled by `callback`.
    pub fn add_callback<C>(&self, fd: RawFd, events: Events, callback: C) -> Result<()>
    where
        C: OnReady + 'static,
    {
        self.add(fd, 0, events, Some(Arc::new(callback)))
    }

    /// Removes a registration.
    ///
    /// Returns whether a registration existed. Once this returns, no poll
    /// call will deliver an event or invoke a callback for `fd`, including
    /// events already collected but not yet handed out.
    ///
    /// Remove a descriptor before closing it. If it is closed first while a
    /// duplicate of it stays open, the kernel keeps reporting it and
    /// `poll_once` keeps waiting through those events until its timeout.
    ///
    /// # Errors
    ///
    /// [`LooperError::RemoveFailure`] if the native call fails for a reason
    /// other than the descriptor already being closed; the registration is
    /// kept in that case.
    pub fn remove(&self, fd: RawFd) -> Result<bool> {
        let mut registry = self.inner.registry.lock();

        match registry.seq_of(fd) {
            Some(seq) => self.deregister(&mut registry, fd, seq),
            None => Ok(false),
        }
    }

    /// Removes `fd` only if it still belongs to registration `seq`.
    fn remove_registration(&self, fd: RawFd, seq: u64) -> Result<bool> {
        let mut registry = self.inner.registry.lock();

        if registry.seq_of(fd) != Some(seq) {
            return Ok(false);
        }

        self.deregister(&mut registry, fd, seq)
    }

    fn deregister(&self, registry: &mut Registry, fd: RawFd, seq: u64) -> Result<bool> {
        match self.inner.poller.deregister(fd) {
            Ok(()) => {}
            Err(err) if matches!(err.raw_os_error(), Some(libc::EBADF | libc::ENOENT)) => {
                debug!("fd {fd} was closed before removal: {err}");
            }
            Err(source) => return Err(LooperError::RemoveFailure { fd, source }),
        }

        registry.remove(seq);
        self.inner.pending.lock().retain(|event| event.fd != fd);
        trace!("removed fd {fd} (#{seq})");

        Ok(true)
    }

    /// Makes a blocked or future [`poll_once`](Self::poll_once) return
    /// [`PollOutcome::Woken`]. Safe to call from any thread; repeated wakes
    /// before the next poll coalesce into one.
    ///
    /// # Panics
    ///
    /// Panics if the internal wake channel is saturated or corrupted.
    pub fn wake(&self) {
        if let Err(err) = self.inner.wake.signal() {
            panic!("looper wake channel is broken: {err}");
        }
    }

    /// Waits for a single outcome.
    ///
    /// Blocks until a registered descriptor is ready, `wake` is called, or
    /// `timeout` elapses (`None` blocks indefinitely). Callbacks of ready
    /// descriptors run before this returns. Ready events of callback-less
    /// descriptors are returned one per call, oldest first.
    ///
    /// # Errors
    ///
    /// [`LooperError::WrongThread`] off the owning thread,
    /// [`LooperError::Poll`] if the native wait fails, and
    /// [`LooperError::WakeChannel`] if the wake counter cannot be reset.
    pub fn poll_once(&self, timeout: Option<Duration>) -> Result<PollOutcome> {
        self.ensure_owner()?;

        if let Some(event) = self.inner.pending.lock().pop_front() {
            return Ok(PollOutcome::Ready(event));
        }

        // An overflowing deadline is as good as none.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            let remaining =
                deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));

            if let Some(outcome) = self.wait_once(remaining)? {
                return Ok(outcome);
            }

            if remaining == Some(Duration::ZERO) {
                return Ok(PollOutcome::TimedOut);
            }
        }
    }

    /// Runs one native wait and handles its batch.
    ///
    /// Returns `None` when every event in the batch belonged to a
    /// registration removed in the meantime, so the caller waits again for
    /// whatever is left of its timeout.
    fn wait_once(&self, timeout: Option<Duration>) -> Result<Option<PollOutcome>> {
        let mut events = Vec::new();

        let polled = {
            let mut buffer = self.inner.buffer.lock();
            self.inner.poller.poll(&mut buffer, &mut events, timeout)
        };

        match polled {
            Ok(0) => return Ok(Some(PollOutcome::TimedOut)),
            Ok(n) => trace!("poll returned {n} events"),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                return Ok(Some(PollOutcome::Woken));
            }
            Err(err) => return Err(LooperError::Poll(err)),
        }

        let (woken, dispatches) = self.collect(events);

        if woken {
            self.inner.wake.drain_count()?;
        }

        let mut handled = false;

        for dispatch in dispatches {
            // An earlier callback in this batch may have removed it.
            if !self.inner.registry.lock().contains(dispatch.seq) {
                trace!("dropping event for removed fd {}", dispatch.fd);
                continue;
            }

            handled = true;

            let result = dispatch.callback.on_ready(dispatch.fd, dispatch.events);
            if result == CallbackResult::Remove {
                if let Err(err) = self.remove_registration(dispatch.fd, dispatch.seq) {
                    warn!("callback asked to remove fd {}: {err}", dispatch.fd);
                }
            }
        }

        if let Some(event) = self.inner.pending.lock().pop_front() {
            return Ok(Some(PollOutcome::Ready(event)));
        }

        if handled {
            Ok(Some(PollOutcome::CallbackHandled))
        } else if woken {
            Ok(Some(PollOutcome::Woken))
        } else {
            trace!("batch only held events for removed registrations");
            Ok(None)
        }
    }

    /// Sorts a native batch into callbacks to dispatch and ready events to
    /// queue. Events for registrations removed since the wait returned are
    /// dropped here.
    fn collect(&self, events: Vec<Event>) -> (bool, Vec<Dispatch>) {
        let registry = self.inner.registry.lock();
        let mut pending = self.inner.pending.lock();

        let mut woken = false;
        let mut dispatches = Vec::new();

        for event in events {
            if event.token == WAKE_TOKEN {
                woken = true;
                continue;
            }

            let Some(registration) = registry.get(event.token) else {
                continue;
            };

            match &registration.callback {
                Some(callback) => dispatches.push(Dispatch {
                    seq: event.token,
                    fd: registration.fd,
                    events: event.events,
                    callback: callback.clone(),
                }),
                None => pending.push_back(ReadyEvent {
                    ident: registration.ident,
                    fd: registration.fd,
                    events: event.events,
                }),
            }
        }

        (woken, dispatches)
    }
}

impl fmt::Debug for Looper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Looper")
            .field("owner", &self.inner.owner)
            .field("options", &self.inner.options)
            .field("registrations", &self.inner.registry.lock().len())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("releasing looper of thread {:?}", self.owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Weak;

    fn inner_of(looper: &Looper) -> Weak<Inner> {
        Arc::downgrade(&looper.inner)
    }

    #[test]
    fn looper_outlives_its_thread_until_last_handle_drops() {
        let remote = thread::spawn(|| Looper::prepare(LooperOptions::default()).unwrap())
            .join()
            .unwrap();

        // The thread's slot released its reference when the thread exited.
        assert_eq!(Arc::strong_count(&remote.inner), 1);

        let inner = inner_of(&remote);
        let clone = remote.clone();
        drop(remote);
        assert!(inner.upgrade().is_some());

        // The poller and wake channel are owned by `Inner` and close with it.
        drop(clone);
        assert!(inner.upgrade().is_none());
    }
}
