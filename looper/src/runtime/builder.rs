use crate::error::Result;
use crate::reactor::Looper;

/// Default number of readiness events collected per native wait.
pub(crate) const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Options a looper is prepared with.
///
/// Two sets of options are compatible when they agree on
/// `allow_non_callbacks`; the event capacity only sizes the poll buffer of
/// the looper that is actually created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LooperOptions {
    /// Accept registrations without a callback, reported by
    /// [`Looper::poll_once`] as [`PollOutcome::Ready`](crate::PollOutcome::Ready).
    pub allow_non_callbacks: bool,

    /// Maximum number of events collected per native wait.
    pub event_capacity: usize,
}

impl LooperOptions {
    pub(crate) fn is_compatible_with(&self, other: &LooperOptions) -> bool {
        self.allow_non_callbacks == other.allow_non_callbacks
    }
}

impl Default for LooperOptions {
    fn default() -> Self {
        Self {
            allow_non_callbacks: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Builder for configuring and preparing a looper.
///
/// # Examples
///
/// ```rust,ignore
/// let looper = LooperBuilder::new()
///     .allow_non_callbacks(true)
///     .prepare()?;
/// ```
#[derive(Debug, Default)]
pub struct LooperBuilder {
    options: LooperOptions,
}

impl LooperBuilder {
    /// Creates a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows descriptors to be registered without a callback.
    pub fn allow_non_callbacks(mut self, allow: bool) -> Self {
        self.options.allow_non_callbacks = allow;
        self
    }

    /// Sets how many events a single native wait may collect.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.options.event_capacity = n;
        self
    }

    /// Returns the configured options.
    pub fn options(&self) -> LooperOptions {
        self.options
    }

    /// Prepares the looper for the calling thread.
    ///
    /// See [`Looper::prepare`].
    pub fn prepare(self) -> Result<Looper> {
        Looper::prepare(self.options)
    }
}
