//! The notification service thread.
//!
//! One dedicated thread multiplexes readiness for every socket carrying a
//! notification registration, updates pending/armed masks and per-event
//! error snapshots, signals event objects, delivers message notifications,
//! and drains the accept queue so freshly accepted sockets inherit their
//! listener's registration. It is the only dispatcher of notifications and
//! the only drainer of the queue.
//!
//! A registration whose socket disappears underneath it is not left
//! dangling: the closer hands it to this thread, which delivers one
//! synthetic terminal notification and drops it.

use std::os::unix::io::RawFd;
use std::sync::{Arc, OnceLock};

use log::trace;
use parking_lot::Mutex;

use crate::registry::{self, AsyncReg, SockRecord, SocketHandle};
use crate::sys;
use winsock_rs_core::error::errno_to_wsa;
use winsock_rs_core::events::{
    FD_ACCEPT, FD_CLOSE, FD_CLOSE_BIT, FD_CONNECT, FD_CONNECT_BIT, FD_MAX_EVENTS, FD_OOB, FD_READ,
    FD_SERVICE, FD_WRITE, ST_ACCEPT_PENDING, ST_CONNECT_PENDING, ST_CONNECTED, ST_LISTENING,
    ST_READABLE, ST_WRITABLE, bit_event, make_select_reply,
};
use winsock_rs_core::state::SocketPhase;

/// Poll tick while idle; wake-ups cut it short.
const SERVICE_TICK_MS: i32 = 100;

struct Orphan {
    handle: SocketHandle,
    reg: AsyncReg,
}

struct Reactor {
    wake_w: RawFd,
    orphans: Mutex<Vec<Orphan>>,
}

static REACTOR: OnceLock<Reactor> = OnceLock::new();

fn instance() -> &'static Reactor {
    REACTOR.get_or_init(|| {
        let mut ends = [0i32; 2];
        // SAFETY: ends is a two-element array for the pipe descriptors.
        let rc = unsafe { libc::pipe2(ends.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        assert_eq!(rc, 0, "service pipe creation failed");
        let wake_r = ends[0];
        std::thread::Builder::new()
            .name("winsock-service".into())
            .spawn(move || service_loop(wake_r))
            .expect("service thread spawn failed");
        Reactor {
            wake_w: ends[1],
            orphans: Mutex::new(Vec::new()),
        }
    })
}

/// Starts the service thread if it is not already running.
pub(crate) fn ensure_started() {
    let _ = instance();
}

/// Interrupts the current poll tick so registration changes take effect
/// immediately.
pub(crate) fn wake() {
    if let Some(reactor) = REACTOR.get() {
        // SAFETY: one byte into a pipe we own; a full pipe already wakes.
        unsafe {
            libc::write(reactor.wake_w, [1u8].as_ptr().cast(), 1);
        }
    }
}

/// Hands a registration whose socket is gone to the service thread for
/// terminal delivery and release.
pub(crate) fn push_orphan(handle: SocketHandle, reg: AsyncReg) {
    instance().orphans.lock().push(Orphan { handle, reg });
    wake();
}

// ---------------------------------------------------------------------------
// Service loop
// ---------------------------------------------------------------------------

fn service_loop(wake_r: RawFd) {
    loop {
        deliver_orphans();

        let watched = registry::registry().watched();
        let mut pollfds = vec![libc::pollfd {
            fd: wake_r,
            events: libc::POLLIN,
            revents: 0,
        }];
        for record in &watched {
            pollfds.push(libc::pollfd {
                fd: record.fd(),
                events: poll_interest(record),
                revents: 0,
            });
        }

        let _ = sys::poll(&mut pollfds, SERVICE_TICK_MS);

        if pollfds[0].revents & libc::POLLIN != 0 {
            drain_wake(wake_r);
        }
        for (record, pollfd) in watched.iter().zip(&pollfds[1..]) {
            if pollfd.revents != 0 {
                observe_readiness(record, pollfd.revents);
            }
        }
        for record in &watched {
            dispatch(record);
        }
    }
}

fn drain_wake(wake_r: RawFd) {
    let mut sink = [0u8; 64];
    // SAFETY: sink is writable for its full length; the pipe is
    // non-blocking, so this returns once empty.
    while unsafe { libc::read(wake_r, sink.as_mut_ptr().cast(), sink.len()) } > 0 {}
}

/// Host poll interest for a record, derived from its mode and whichever
/// armed events its registration cares about.
fn poll_interest(record: &Arc<SockRecord>) -> i16 {
    let state = record.state.lock();
    let watch = state.armed & state.event_mask;
    let mut events = 0i16;
    if state.status & ST_LISTENING != 0 {
        if watch & FD_ACCEPT != 0 {
            events |= libc::POLLIN;
        }
    } else if state.status & ST_CONNECT_PENDING != 0 {
        if watch & FD_CONNECT != 0 {
            events |= libc::POLLOUT;
        }
    } else {
        if watch & (FD_READ | FD_CLOSE) != 0 {
            events |= libc::POLLIN;
        }
        if watch & FD_WRITE != 0 {
            events |= libc::POLLOUT;
        }
        if watch & FD_OOB != 0 {
            events |= libc::POLLPRI;
        }
    }
    events
}

/// Folds one poll result into the record: readiness snapshot, connect
/// completion, pending/armed update, per-event error capture, event-object
/// signaling.
fn observe_readiness(record: &Arc<SockRecord>, revents: i16) {
    let mut state = record.state.lock();
    let mut ready = 0u32;

    if state.status & ST_CONNECT_PENDING != 0 {
        if revents & (libc::POLLOUT | libc::POLLERR | libc::POLLHUP) != 0 {
            let err = sys::so_error(record.fd());
            state.errors[FD_CONNECT_BIT] = errno_to_wsa(err);
            ready |= FD_CONNECT;
            state.status &= !ST_CONNECT_PENDING;
            if err == 0 {
                state.status |= ST_CONNECTED | ST_WRITABLE;
                state.phase = SocketPhase::Connected;
            }
        }
    } else {
        if revents & libc::POLLIN != 0 {
            if state.status & ST_LISTENING != 0 {
                ready |= FD_ACCEPT;
                state.status |= ST_ACCEPT_PENDING;
            } else {
                ready |= FD_READ;
                state.status |= ST_READABLE;
            }
        }
        if revents & libc::POLLOUT != 0 {
            ready |= FD_WRITE;
            state.status |= ST_WRITABLE;
        }
        if revents & libc::POLLPRI != 0 {
            ready |= FD_OOB;
        }
        if revents & (libc::POLLHUP | libc::POLLERR) != 0 {
            state.errors[FD_CLOSE_BIT] = errno_to_wsa(sys::so_error(record.fd()));
            ready |= FD_CLOSE;
        }
    }

    let newly = ready & state.armed & state.event_mask;
    if newly != 0 {
        state.pending |= newly;
        state.armed &= !newly;
        trace!("socket {:#x}: readiness {newly:#x} pending", record.handle());
        if let Some(event) = &state.event {
            event.set();
        }
    }
}

/// Delivers pending message notifications and performs accept-queue
/// inheritance for one record.
fn dispatch(record: &Arc<SockRecord>) {
    let (reg, pmask, errors) = {
        let mut state = record.state.lock();
        let Some(reg) = state.async_reg.clone() else {
            return;
        };
        let pmask = state.pending & (reg.mask | FD_SERVICE);
        if pmask == 0 {
            return;
        }
        state.pending &= !pmask;
        if pmask & FD_SERVICE != 0 {
            state.status &= !ST_ACCEPT_PENDING;
        }
        (reg, pmask, state.errors)
    };

    if pmask & FD_SERVICE != 0 {
        // Accepted sockets inherit the listener's registration, deferred to
        // this dispatch cycle via the queue.
        let child_reg = reg.clone();
        registry::registry()
            .accept_queue
            .drain(record.handle(), |accepted| {
                trace!(
                    "socket {:#x} inherits registration from listener {:#x}",
                    accepted,
                    record.handle()
                );
                let _ = registry::registry().set_async_select(
                    accepted,
                    Some((Arc::clone(&child_reg.sink), child_reg.msg)),
                    child_reg.mask,
                );
            });
    }

    for bit in 0..FD_MAX_EVENTS {
        let event = bit_event(bit);
        if pmask & event != 0 {
            reg.sink
                .post(record.handle(), reg.msg, make_select_reply(event, errors[bit]));
        }
    }
}

fn deliver_orphans() {
    let orphans = std::mem::take(&mut *instance().orphans.lock());
    for orphan in orphans {
        trace!(
            "orphaned registration on {:#x}: delivering terminal close",
            orphan.handle
        );
        orphan
            .reg
            .sink
            .post(orphan.handle, orphan.reg.msg, make_select_reply(FD_CLOSE, 0));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChannelSink;
    use std::time::Duration;

    #[test]
    fn closing_a_registered_socket_delivers_terminal_close() {
        let reg = registry::registry();
        let handle = reg
            .create_socket(libc::AF_INET, libc::SOCK_DGRAM, 0)
            .unwrap();
        let (sink, rx) = ChannelSink::new();
        reg.set_async_select(handle, Some((sink, 0x7001)), FD_READ | FD_CLOSE)
            .unwrap();

        reg.close_socket(handle).unwrap();

        let note = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("terminal notification should arrive");
        assert_eq!(note.socket, handle);
        assert_eq!(note.msg, 0x7001);
        assert_eq!(note.event(), FD_CLOSE);
        assert_eq!(note.error(), 0);
    }
}
