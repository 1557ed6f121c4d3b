//! Single-descriptor readiness waits.
//!
//! The blocking-mode contract: a call that would block on a default-mode
//! socket parks the calling thread in a host readiness wait, then retries
//! the syscall exactly once. The wait mask mirrors the three classic
//! readiness classes.

use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::error::{SockError, SockResult};
use crate::sys;
use winsock_rs_core::error as werr;

pub const WAIT_READ: u32 = 1 << 0;
pub const WAIT_WRITE: u32 = 1 << 1;
pub const WAIT_EXCEPT: u32 = 1 << 2;

/// Translates a wait mask to host poll interest bits.
#[must_use]
pub(crate) const fn poll_events(mask: u32) -> i16 {
    let mut events = 0i16;
    if mask & WAIT_READ != 0 {
        events |= libc::POLLIN;
    }
    if mask & WAIT_WRITE != 0 {
        events |= libc::POLLOUT;
    }
    if mask & WAIT_EXCEPT != 0 {
        events |= libc::POLLPRI;
    }
    events
}

/// Waits until the descriptor is ready for any class in `mask`.
///
/// Returns the mask of classes that became ready. `None` timeout blocks
/// indefinitely; `EINTR` surfaces as [`SockError::Interrupted`] rather than
/// being retried, so callers decide.
pub fn wait_readiness(fd: RawFd, mask: u32, timeout: Option<Duration>) -> SockResult<u32> {
    let timeout_ms = match timeout {
        None => -1,
        Some(d) => i32::try_from(d.as_millis()).unwrap_or(i32::MAX),
    };
    let mut fds = [libc::pollfd {
        fd,
        events: poll_events(mask),
        revents: 0,
    }];

    match sys::poll(&mut fds, timeout_ms) {
        Err(errno) => Err(SockError::from_errno(errno)),
        Ok(0) => Err(SockError::Transport(werr::WSAETIMEDOUT)),
        Ok(_) => {
            let re = fds[0].revents;
            let mut ready = 0;
            if re & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                ready |= WAIT_READ;
            }
            if re & (libc::POLLOUT | libc::POLLERR) != 0 {
                ready |= WAIT_WRITE;
            }
            if re & libc::POLLPRI != 0 {
                ready |= WAIT_EXCEPT;
            }
            Ok(ready)
        }
    }
}
