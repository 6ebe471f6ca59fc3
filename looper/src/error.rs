use crate::runtime::builder::LooperOptions;

use std::io;
use std::os::fd::RawFd;

/// Convenience alias used throughout the crate.
pub type Result<T, E = LooperError> = std::result::Result<T, E>;

/// Errors produced by the looper, its wake channels and serial executors.
///
/// Each variant documents whether the condition is recoverable. The
/// `WakeChannel` variant describes a broken platform invariant and is
/// turned into a panic by the executor rather than handed to producers.
#[derive(Debug, thiserror::Error)]
pub enum LooperError {
    /// A looper could not be created for the calling thread, or one already
    /// exists with incompatible options. Fatal for the caller.
    #[error("failed to prepare looper with {0:?}")]
    PreparationFailure(LooperOptions),

    /// The calling thread has no prepared looper.
    #[error("no looper has been prepared for this thread")]
    NotPrepared,

    /// The descriptor was rejected. The caller may retry or treat the
    /// source as unavailable.
    #[error("failed to add fd {fd} to looper")]
    AddFailure {
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    /// The native deregistration call failed.
    #[error("failed to remove fd {fd} from looper")]
    RemoveFailure {
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    /// The native wait failed. The loop driving `poll_once` should stop.
    #[error("looper poll failed")]
    Poll(#[source] io::Error),

    /// A thread-affine operation was attempted from a foreign thread.
    #[error("operation must run on the thread that owns the looper")]
    WrongThread,

    /// Short read or write on an eventfd, or a saturated counter.
    #[error("wake channel I/O did not complete: {0}")]
    WakeChannel(#[source] io::Error),

    /// The serial executor has been shut down.
    #[error("executor is closed")]
    ExecutorClosed,

    /// The task was aborted or discarded before it produced a value.
    #[error("task was cancelled before completion")]
    TaskCancelled,

    /// The main loop has not been set up, or was torn down.
    #[error("main loop is not set up")]
    MainLoopUnavailable,
}

impl LooperError {
    pub(crate) fn add_failure(fd: RawFd, kind: io::ErrorKind, msg: &'static str) -> Self {
        LooperError::AddFailure {
            fd,
            source: io::Error::new(kind, msg),
        }
    }
}
