//! The procedural sockets surface.
//!
//! One function per application-visible call. Every entry point resolves
//! its handle, validates against the lifecycle contract before any host
//! syscall, performs the translated host operation, funnels state changes
//! through the registry's enable-event primitive, and publishes failures to
//! the thread-local last-error cell on the way out.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use log::{trace, warn};
use parking_lot::Mutex;

use crate::block::{self, WAIT_EXCEPT, WAIT_READ, WAIT_WRITE};
use crate::error::{SockError, SockResult, surface};
use crate::event::{MessageSink, WsEvent};
use crate::lookup;
use crate::option::{self, IoctlCmd, SetoptAction};
use crate::registry::{LISTEN_ARM, SockRecord, SocketHandle, registry};
use crate::sys;
use winsock_rs_core::dirrec::{HostRecord, ProtoRecord, PtrEncoding, ServRecord};
use winsock_rs_core::error as werr;
use winsock_rs_core::events::{
    FD_ACCEPT_BIT, FD_CONNECT, FD_CONNECT_BIT, FD_MAX_EVENTS, FD_READ, FD_WRITE, ST_CONNECTED,
    ST_CONNECT_PENDING, ST_LISTENING, ST_NONBLOCKING, ST_READABLE, ST_WRITABLE,
};
use winsock_rs_core::sockdef::{
    self, WS_SD_BOTH, WS_SD_RECEIVE, WS_SD_SEND,
};
use winsock_rs_core::startup::{WsaData, negotiate};
use winsock_rs_core::state::{SockOp, SocketPhase, phase_transition};

pub use crate::select::select;
pub use winsock_rs_core::error::{last_error, set_last_error};
pub use winsock_rs_core::inet::{htonl, htons, inet_addr, inet_ntoa, ntohl, ntohs};

// ---------------------------------------------------------------------------
// Startup / cleanup
// ---------------------------------------------------------------------------

static STARTUP_COUNT: AtomicI32 = AtomicI32::new(0);
static BLOCKING_HOOK: Mutex<Option<fn()>> = Mutex::new(None);

/// Initializes the sockets layer, negotiating the specification version.
/// Reference-counted: every successful call needs a matching [`cleanup`].
pub fn startup(version: u16) -> SockResult<WsaData> {
    surface(match negotiate(version) {
        Ok(data) => {
            STARTUP_COUNT.fetch_add(1, Ordering::SeqCst);
            trace!("startup: negotiated version {:#06x}", data.version);
            Ok(data)
        }
        Err(code) => Err(SockError::Unsupported(code)),
    })
}

/// Releases one startup reference.
pub fn cleanup() -> SockResult<()> {
    surface(
        if STARTUP_COUNT
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                if count > 0 { Some(count - 1) } else { None }
            })
            .is_ok()
        {
            Ok(())
        } else {
            Err(SockError::NotInitialised)
        },
    )
}

/// Blocking calls here truly block, so no caller is ever "inside" the
/// pseudo-blocking message loop the original API exposes.
#[must_use]
pub fn is_blocking() -> bool {
    false
}

/// Nothing to cancel; blocking waits end on their own.
pub fn cancel_blocking_call() -> SockResult<()> {
    Ok(())
}

/// Stores the caller's blocking hook and returns the previous one. The
/// hook is retained for API fidelity; truly blocking waits never invoke it.
pub fn set_blocking_hook(hook: fn()) -> Option<fn()> {
    BLOCKING_HOOK.lock().replace(hook)
}

pub fn unhook_blocking_hook() {
    BLOCKING_HOOK.lock().take();
}

// ---------------------------------------------------------------------------
// Lifecycle helpers
// ---------------------------------------------------------------------------

fn resolve(handle: SocketHandle) -> SockResult<Arc<SockRecord>> {
    registry().resolve(handle)
}

/// Validates an operation against the lifecycle contract without
/// committing the transition.
fn check_phase(record: &Arc<SockRecord>, op: SockOp) -> SockResult<SocketPhase> {
    let state = record.state.lock();
    let outcome = phase_transition(state.phase, op);
    if outcome.wsa != 0 {
        return Err(SockError::Unsupported(outcome.wsa));
    }
    Ok(outcome.next)
}

fn commit_phase(record: &Arc<SockRecord>, next: SocketPhase) {
    record.state.lock().phase = next;
}

fn blocking(record: &Arc<SockRecord>) -> bool {
    registry().is_blocking(record)
}

// ---------------------------------------------------------------------------
// Socket lifecycle
// ---------------------------------------------------------------------------

/// Creates a socket, checking family, type, and protocol before the host
/// sees anything. An unspecified family is inferred from the protocol.
pub fn socket(family: i32, stype: i32, protocol: i32) -> SockResult<SocketHandle> {
    surface((|| {
        sockdef::check_family(family).map_err(SockError::Unsupported)?;
        sockdef::check_socket_type(stype).map_err(SockError::Unsupported)?;
        let family = sockdef::infer_family(family, stype, protocol).map_err(SockError::Unsupported)?;

        // The internet family and the three base types share the host's
        // numbering; protocols are IANA-assigned on both sides.
        debug_assert_eq!(sockdef::WS_AF_INET, libc::AF_INET);
        registry().create_socket(family, stype, protocol)
    })())
}

pub fn closesocket(handle: SocketHandle) -> SockResult<()> {
    surface(registry().close_socket(handle))
}

pub fn bind(handle: SocketHandle, addr: SocketAddrV4) -> SockResult<()> {
    surface((|| {
        let record = resolve(handle)?;
        let next = check_phase(&record, SockOp::Bind)?;
        trace!("bind {handle:#x} -> {addr}");
        sys::bind(record.fd(), addr).map_err(|errno| match errno {
            libc::EBADF => SockError::NotSocket,
            // Address-not-available reports as a plain invalid argument.
            libc::EADDRNOTAVAIL => SockError::Transport(werr::WSAEINVAL),
            other => SockError::from_errno(other),
        })?;
        commit_phase(&record, next);
        Ok(())
    })())
}

pub fn listen(handle: SocketHandle, backlog: i32) -> SockResult<()> {
    surface((|| {
        let record = resolve(handle)?;
        let next = check_phase(&record, SockOp::Listen)?;
        sys::listen(record.fd(), backlog).map_err(SockError::from_errno)?;
        commit_phase(&record, next);
        registry().enable_socket_event(
            handle,
            LISTEN_ARM,
            ST_LISTENING,
            ST_CONNECT_PENDING | ST_CONNECTED,
        );
        trace!("listen {handle:#x} backlog {backlog}");
        Ok(())
    })())
}

fn finish_connect(handle: SocketHandle, record: &Arc<SockRecord>) {
    commit_phase(record, SocketPhase::Connected);
    registry().enable_socket_event(
        handle,
        FD_CONNECT | FD_READ | FD_WRITE,
        ST_CONNECTED | ST_WRITABLE,
        ST_CONNECT_PENDING | ST_LISTENING,
    );
}

/// Connects to a peer. On a blocking-mode socket an in-progress host
/// connect parks in a readiness wait and is then resolved exactly once; a
/// non-blocking socket surfaces would-block immediately.
pub fn connect(handle: SocketHandle, addr: SocketAddrV4) -> SockResult<()> {
    surface((|| {
        let record = resolve(handle)?;
        check_phase(&record, SockOp::ConnectStart)?;
        trace!("connect {handle:#x} -> {addr}");

        match sys::connect(record.fd(), addr) {
            Ok(()) => {
                finish_connect(handle, &record);
                Ok(())
            }
            Err(libc::EINPROGRESS) => {
                commit_phase(&record, SocketPhase::Connecting);
                registry().enable_socket_event(
                    handle,
                    FD_CONNECT | FD_READ | FD_WRITE,
                    ST_CONNECT_PENDING,
                    ST_CONNECTED | ST_LISTENING,
                );
                if !blocking(&record) {
                    return Err(SockError::WouldBlock);
                }
                block::wait_readiness(record.fd(), WAIT_READ | WAIT_WRITE | WAIT_EXCEPT, None)?;
                let err = sys::so_error(record.fd());
                if err == 0 {
                    finish_connect(handle, &record);
                    Ok(())
                } else {
                    let wsa = werr::errno_to_wsa(err);
                    {
                        let mut state = record.state.lock();
                        state.errors[FD_CONNECT_BIT] = wsa;
                        state.status &= !ST_CONNECT_PENDING;
                        state.phase = SocketPhase::Bound;
                    }
                    Err(SockError::Transport(wsa))
                }
            }
            Err(errno) => Err(SockError::from_errno(errno)),
        }
    })())
}

/// Accepts a pending connection. The new socket is already connected and,
/// when the listener carries a message registration, inherits it at the
/// next dispatch cycle through the accept queue.
pub fn accept(handle: SocketHandle) -> SockResult<(SocketHandle, Option<SocketAddrV4>)> {
    surface((|| {
        let record = resolve(handle)?;
        check_phase(&record, SockOp::Accept)?;
        if blocking(&record) {
            block::wait_readiness(record.fd(), WAIT_READ | WAIT_EXCEPT, None)?;
            let pending = registry().event_error(&record, FD_ACCEPT_BIT);
            if pending != 0 {
                return Err(SockError::Transport(pending));
            }
        }
        let (accepted, peer) = registry().accept_socket(&record)?;

        let has_async = record.state.lock().async_reg.is_some();
        if has_async {
            registry().queue_accept(&record, accepted);
        }
        trace!("accept {handle:#x} -> {accepted:#x}");
        Ok((accepted, peer))
    })())
}

/// Shuts a connection down. Partial shutdown keeps the socket usable in
/// the other direction; full shutdown also cancels any notification
/// registration.
pub fn shutdown(handle: SocketHandle, how: i32) -> SockResult<()> {
    surface((|| {
        if !sockdef::valid_shutdown_how(how) {
            return Err(SockError::Unsupported(werr::WSAEINVAL));
        }
        let record = resolve(handle)?;
        let op = match how {
            WS_SD_RECEIVE => SockOp::ShutdownRecv,
            WS_SD_SEND => SockOp::ShutdownSend,
            _ => SockOp::ShutdownBoth,
        };
        let next = check_phase(&record, op)?;

        if how == WS_SD_BOTH {
            let _ = registry().set_async_select(handle, None, 0);
        }
        sys::shutdown(record.fd(), how).map_err(SockError::from_errno)?;
        commit_phase(&record, next);
        match how {
            WS_SD_RECEIVE => registry().enable_socket_event(handle, 0, 0, ST_READABLE),
            WS_SD_SEND => registry().enable_socket_event(handle, 0, 0, ST_WRITABLE),
            _ => registry().enable_socket_event(handle, 0, 0, ST_CONNECTED | ST_LISTENING),
        }
        Ok(())
    })())
}

// ---------------------------------------------------------------------------
// I/O
// ---------------------------------------------------------------------------

fn would_block_read(handle: SocketHandle) -> SockError {
    // Readiness was consumed (or never there): clear the snapshot and
    // re-arm read reporting.
    registry().enable_socket_event(handle, FD_READ, 0, ST_READABLE);
    SockError::WouldBlock
}

fn would_block_write(handle: SocketHandle) -> SockError {
    registry().enable_socket_event(handle, FD_WRITE, 0, ST_WRITABLE);
    SockError::WouldBlock
}

/// Receives into `buf`. In blocking mode the call suspends until data (or
/// an error) arrives instead of surfacing would-block.
pub fn recv(handle: SocketHandle, buf: &mut [u8], flags: i32) -> SockResult<usize> {
    surface((|| {
        let record = resolve(handle)?;
        if blocking(&record) {
            block::wait_readiness(record.fd(), WAIT_READ, None)?;
        }
        match sys::recv(record.fd(), buf, flags) {
            Ok(n) => {
                trace!("recv {handle:#x}: {n} bytes");
                registry().enable_socket_event(handle, FD_READ, 0, 0);
                Ok(n)
            }
            Err(libc::EAGAIN) => Err(would_block_read(handle)),
            Err(errno) => Err(SockError::from_errno(errno)),
        }
    })())
}

/// Receive variant that tolerates partial messages; the partial condition
/// itself is not reported separately.
pub fn recv_ex(handle: SocketHandle, buf: &mut [u8], flags: i32) -> SockResult<usize> {
    warn!("recv_ex: partial-message indication is not reported");
    recv(handle, buf, flags)
}

pub fn recv_from(
    handle: SocketHandle,
    buf: &mut [u8],
    flags: i32,
) -> SockResult<(usize, Option<SocketAddrV4>)> {
    surface((|| {
        let record = resolve(handle)?;
        if blocking(&record) {
            block::wait_readiness(record.fd(), WAIT_READ, None)?;
        }
        match sys::recv_from(record.fd(), buf, flags) {
            Ok((n, from)) => {
                registry().enable_socket_event(handle, FD_READ, 0, 0);
                Ok((n, from))
            }
            Err(libc::EAGAIN) => Err(would_block_read(handle)),
            Err(errno) => Err(SockError::from_errno(errno)),
        }
    })())
}

pub fn send(handle: SocketHandle, buf: &[u8], flags: i32) -> SockResult<usize> {
    surface((|| {
        let record = resolve(handle)?;
        if blocking(&record) {
            block::wait_readiness(record.fd(), WAIT_WRITE, None)?;
        }
        match sys::send(record.fd(), buf, flags) {
            Ok(n) => {
                trace!("send {handle:#x}: {n} bytes");
                Ok(n)
            }
            Err(libc::EAGAIN) => Err(would_block_write(handle)),
            Err(errno) => Err(SockError::from_errno(errno)),
        }
    })())
}

pub fn send_to(
    handle: SocketHandle,
    buf: &[u8],
    flags: i32,
    to: SocketAddrV4,
) -> SockResult<usize> {
    surface((|| {
        let record = resolve(handle)?;
        if blocking(&record) {
            block::wait_readiness(record.fd(), WAIT_WRITE, None)?;
        }
        match sys::send_to(record.fd(), buf, flags, to) {
            Ok(n) => Ok(n),
            Err(libc::EAGAIN) => Err(would_block_write(handle)),
            Err(errno) => Err(SockError::from_errno(errno)),
        }
    })())
}

/// Scatter send: every buffer goes out with the same flags; the first
/// failure stops the sweep. Bytes already sent are reported either way
/// via the `Ok` total when at least one buffer went through.
pub fn send_vectored(handle: SocketHandle, buffers: &[&[u8]], flags: i32) -> SockResult<usize> {
    surface((|| {
        let mut total = 0usize;
        for buf in buffers {
            match send(handle, buf, flags) {
                Ok(n) => total += n,
                Err(err) if total == 0 => return Err(err),
                Err(_) => break,
            }
        }
        Ok(total)
    })())
}

/// Gather receive: fills the buffers in order from successive receives,
/// stopping at the first failure. Returns the total plus the last peer
/// address seen.
pub fn recv_from_vectored(
    handle: SocketHandle,
    buffers: &mut [&mut [u8]],
    flags: i32,
) -> SockResult<(usize, Option<SocketAddrV4>)> {
    surface((|| {
        let mut total = 0usize;
        let mut from = None;
        for buf in buffers {
            match recv_from(handle, buf, flags) {
                Ok((n, peer)) => {
                    total += n;
                    from = peer.or(from);
                }
                Err(err) if total == 0 => return Err(err),
                Err(_) => break,
            }
        }
        Ok((total, from))
    })())
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

pub fn getsockname(handle: SocketHandle) -> SockResult<SocketAddrV4> {
    surface((|| {
        let record = resolve(handle)?;
        sys::getsockname(record.fd()).map_err(SockError::from_errno)
    })())
}

pub fn getpeername(handle: SocketHandle) -> SockResult<SocketAddrV4> {
    surface((|| {
        let record = resolve(handle)?;
        sys::getpeername(record.fd()).map_err(SockError::from_errno)
    })())
}

pub fn gethostname() -> SockResult<String> {
    surface(lookup::gethostname())
}

// ---------------------------------------------------------------------------
// Options and ioctls
// ---------------------------------------------------------------------------

pub fn setsockopt(handle: SocketHandle, level: i32, name: i32, value: &[u8]) -> SockResult<()> {
    surface((|| {
        let record = resolve(handle)?;
        match option::prepare_setsockopt(level, name, value)? {
            SetoptAction::Noop => Ok(()),
            SetoptAction::Apply { level, name, value } => {
                sys::setsockopt_raw(record.fd(), level, name, &value)
                    .map_err(SockError::from_errno)
            }
        }
    })())
}

/// Reads an option through the translated pair; the host payload is
/// returned as-is. Unknown pairs fail firmly.
pub fn getsockopt(
    handle: SocketHandle,
    level: i32,
    name: i32,
    value: &mut [u8],
) -> SockResult<usize> {
    surface((|| {
        let record = resolve(handle)?;
        let (host_level, host_name) = option::translate_option(level, name)
            .ok_or(SockError::Unsupported(werr::WSAENOPROTOOPT))?;
        sys::getsockopt_raw(record.fd(), host_level, host_name, value).map_err(|errno| {
            if errno == libc::EBADF {
                SockError::NotSocket
            } else {
                SockError::from_errno(errno)
            }
        })
    })())
}

/// Socket ioctl. The blocking toggle is emulated (host descriptors stay
/// non-blocking); an async-selected socket refuses to go blocking again.
pub fn ioctlsocket(handle: SocketHandle, cmd: u32, arg: &mut i32) -> SockResult<()> {
    surface((|| {
        let record = resolve(handle)?;
        match option::translate_ioctl(cmd)? {
            IoctlCmd::Nbio => {
                if registry().notification_mask(&record) != 0 {
                    // Async-selected sockets are always non-blocking.
                    return if *arg != 0 {
                        Ok(())
                    } else {
                        Err(SockError::Unsupported(werr::WSAEINVAL))
                    };
                }
                if *arg != 0 {
                    registry().enable_socket_event(handle, 0, ST_NONBLOCKING, 0);
                } else {
                    registry().enable_socket_event(handle, 0, 0, ST_NONBLOCKING);
                }
                Ok(())
            }
            cmd => {
                sys::ioctl_arg(record.fd(), option::host_ioctl_code(cmd), arg).map_err(|errno| {
                    if errno == libc::EBADF {
                        SockError::NotSocket
                    } else {
                        SockError::from_errno(errno)
                    }
                })
            }
        }
    })())
}

// ---------------------------------------------------------------------------
// Async extensions
// ---------------------------------------------------------------------------

/// Creates a manual-reset event object, initially unsignaled.
#[must_use]
pub fn create_event() -> Arc<WsEvent> {
    WsEvent::new()
}

/// Releases an event object. Waiters already parked keep their reference.
pub fn close_event(event: Arc<WsEvent>) {
    drop(event);
}

/// Registers interest in `mask` on an event object (or clears the
/// registration with `None`). Readiness changes signal the event; the
/// pending details are read with [`enum_network_events`].
pub fn event_select(
    handle: SocketHandle,
    event: Option<Arc<WsEvent>>,
    mask: u32,
) -> SockResult<()> {
    surface(registry().set_socket_event(handle, event, mask))
}

/// Reads and consumes the pending network events and their per-event
/// error snapshots, resetting the associated event object.
pub fn enum_network_events(handle: SocketHandle) -> SockResult<(u32, [i32; FD_MAX_EVENTS])> {
    surface(registry().get_socket_event(handle, true))
}

/// Registers message-based notification: readiness changes post
/// `(socket, msg, reply)` to the sink. A zero mask cancels, as does `None`.
pub fn async_select(
    handle: SocketHandle,
    sink: Option<(Arc<dyn MessageSink>, u32)>,
    mask: u32,
) -> SockResult<()> {
    surface(match sink {
        Some(pair) if mask != 0 => registry().set_async_select(handle, Some(pair), mask),
        _ => registry().set_async_select(handle, None, 0),
    })
}

// ---------------------------------------------------------------------------
// Directory lookups
// ---------------------------------------------------------------------------

pub fn gethostbyname(name: &str) -> SockResult<HostRecord> {
    surface(lookup::host_by_name(name))
}

pub fn gethostbyaddr(addr: Ipv4Addr) -> SockResult<HostRecord> {
    surface(lookup::host_by_addr(addr))
}

pub fn getprotobyname(name: &str) -> SockResult<ProtoRecord> {
    surface(lookup::proto_by_name(name))
}

pub fn getprotobynumber(number: i16) -> SockResult<ProtoRecord> {
    surface(lookup::proto_by_number(number))
}

pub fn getservbyname(name: &str, proto: Option<&str>) -> SockResult<ServRecord> {
    surface(lookup::serv_by_name(name, proto))
}

/// Port is in network byte order, as the original surface takes it.
pub fn getservbyport(port_net: u16, proto: Option<&str>) -> SockResult<ServRecord> {
    surface(lookup::serv_by_port(port_net, proto))
}

/// Marshalled host lookup: the record flattened under the caller's pointer
/// encoding.
pub fn gethostbyname_marshalled(name: &str, enc: PtrEncoding) -> SockResult<Vec<u8>> {
    surface((|| {
        let record = lookup::host_by_name(name)?;
        lookup::marshal_host(&record, enc)
    })())
}

pub fn getprotobyname_marshalled(name: &str, enc: PtrEncoding) -> SockResult<Vec<u8>> {
    surface((|| {
        let record = lookup::proto_by_name(name)?;
        lookup::marshal_proto(&record, enc)
    })())
}

pub fn getservbyname_marshalled(
    name: &str,
    proto: Option<&str>,
    enc: PtrEncoding,
) -> SockResult<Vec<u8>> {
    surface((|| {
        let record = lookup::serv_by_name(name, proto)?;
        lookup::marshal_serv(&record, enc)
    })())
}

/// Blocking-mode read helper used by a couple of tests and callers that
/// want the classic "wait then read once" contract with a bound.
pub fn recv_timeout(
    handle: SocketHandle,
    buf: &mut [u8],
    flags: i32,
    timeout: Duration,
) -> SockResult<usize> {
    surface((|| {
        let record = resolve(handle)?;
        block::wait_readiness(record.fd(), WAIT_READ, Some(timeout))?;
        match sys::recv(record.fd(), buf, flags) {
            Ok(n) => {
                registry().enable_socket_event(handle, FD_READ, 0, 0);
                Ok(n)
            }
            Err(libc::EAGAIN) => Err(would_block_read(handle)),
            Err(errno) => Err(SockError::from_errno(errno)),
        }
    })())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
