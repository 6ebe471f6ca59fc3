use crate::reactor::Looper;

use std::cell::RefCell;

thread_local! {
    /// The looper prepared for the current thread.
    ///
    /// The slot holds a strong reference, so a prepared looper lives at
    /// least as long as its thread.
    pub(crate) static CURRENT_LOOPER: RefCell<Option<Looper>> =
        const { RefCell::new(None) };
}

/// Returns a handle to the current thread's looper, if one was prepared.
pub(crate) fn current_looper() -> Option<Looper> {
    CURRENT_LOOPER.with(|slot| slot.borrow().clone())
}

/// Runs `f` with mutable access to the current thread's looper slot.
pub(crate) fn with_looper_slot<R>(f: impl FnOnce(&mut Option<Looper>) -> R) -> R {
    CURRENT_LOOPER.with(|slot| f(&mut slot.borrow_mut()))
}
