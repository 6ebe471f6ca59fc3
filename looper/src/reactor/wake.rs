use crate::error::{LooperError, Result};
use crate::reactor::poller::platform::{sys_eventfd, sys_read, sys_write};

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

const COUNTER_SIZE: usize = mem::size_of::<u64>();

/// A pollable 64-bit counter backed by an `eventfd`.
///
/// Any thread may [`signal`](Self::signal); only the thread that owns the
/// looper registration should [`drain_count`](Self::drain_count). The
/// descriptor becomes readable whenever the counter is non-zero.
#[derive(Debug)]
pub struct WakeChannel {
    fd: OwnedFd,
}

impl WakeChannel {
    /// Creates a channel with a zero counter.
    pub fn new() -> io::Result<Self> {
        Ok(Self { fd: sys_eventfd()? })
    }

    /// Adds one to the counter.
    ///
    /// Fails with [`LooperError::WakeChannel`] if the 8-byte write does not
    /// complete in full, including when the counter is saturated.
    pub fn signal(&self) -> Result<()> {
        let value: u64 = 1;
        let n = sys_write(self.fd.as_raw_fd(), &value.to_ne_bytes());

        if n < 0 {
            return Err(LooperError::WakeChannel(io::Error::last_os_error()));
        }
        if n as usize != COUNTER_SIZE {
            return Err(LooperError::WakeChannel(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write to eventfd",
            )));
        }

        Ok(())
    }

    /// Reads the counter and resets it to zero in one step.
    ///
    /// An un-signalled channel reports `0`.
    pub fn drain_count(&self) -> Result<u64> {
        let mut buf = [0u8; COUNTER_SIZE];
        let n = sys_read(self.fd.as_raw_fd(), &mut buf);

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(LooperError::WakeChannel(err));
        }
        if n as usize != COUNTER_SIZE {
            return Err(LooperError::WakeChannel(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "short read from eventfd",
            )));
        }

        Ok(u64::from_ne_bytes(buf))
    }
}

impl AsRawFd for WakeChannel {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_on_fresh_channel_is_zero() {
        let channel = WakeChannel::new().unwrap();
        assert_eq!(channel.drain_count().unwrap(), 0);
    }

    #[test]
    fn signals_accumulate_until_drained() {
        let channel = WakeChannel::new().unwrap();
        for _ in 0..5 {
            channel.signal().unwrap();
        }

        assert_eq!(channel.drain_count().unwrap(), 5);
        assert_eq!(channel.drain_count().unwrap(), 0);
    }

    #[test]
    fn concurrent_signals_are_all_counted() {
        let channel = std::sync::Arc::new(WakeChannel::new().unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let channel = channel.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        channel.signal().unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(channel.drain_count().unwrap(), 1000);
    }

    #[test]
    fn saturated_counter_rejects_signal() {
        let channel = WakeChannel::new().unwrap();
        let max = u64::MAX - 1;
        assert_eq!(
            sys_write(channel.as_raw_fd(), &max.to_ne_bytes()),
            COUNTER_SIZE as isize
        );

        assert!(matches!(
            channel.signal(),
            Err(LooperError::WakeChannel(_))
        ));
    }
}
