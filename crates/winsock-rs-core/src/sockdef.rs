//! Windows sockets constants and argument validators.
//!
//! These are the values applications pass across the API boundary. They
//! frequently differ from the host's numbering (most visibly `SOL_SOCKET`
//! and the `SO_*` names), which is why the translation tables in the host
//! crate exist at all.

use crate::error::{
    WSAEAFNOSUPPORT, WSAEPROTONOSUPPORT, WSAEPROTOTYPE, WSAESOCKTNOSUPPORT,
};

// ---------------------------------------------------------------------------
// Address families (Windows numbering)
// ---------------------------------------------------------------------------

pub const WS_AF_UNSPEC: i32 = 0;
pub const WS_AF_UNIX: i32 = 1;
pub const WS_AF_INET: i32 = 2;
pub const WS_AF_IPX: i32 = 6;
/// Note: differs from the Linux value (10).
pub const WS_AF_INET6: i32 = 23;

// ---------------------------------------------------------------------------
// Socket types
// ---------------------------------------------------------------------------

pub const WS_SOCK_STREAM: i32 = 1;
pub const WS_SOCK_DGRAM: i32 = 2;
pub const WS_SOCK_RAW: i32 = 3;

// ---------------------------------------------------------------------------
// Protocols
// ---------------------------------------------------------------------------

pub const WS_IPPROTO_TCP: i32 = 6;
pub const WS_IPPROTO_UDP: i32 = 17;

// ---------------------------------------------------------------------------
// Shutdown modes
// ---------------------------------------------------------------------------

pub const WS_SD_RECEIVE: i32 = 0;
pub const WS_SD_SEND: i32 = 1;
pub const WS_SD_BOTH: i32 = 2;

// ---------------------------------------------------------------------------
// Socket option levels and names (Windows numbering)
// ---------------------------------------------------------------------------

pub const WS_SOL_SOCKET: i32 = 0xFFFF;

pub const WS_SO_DEBUG: i32 = 0x0001;
pub const WS_SO_ACCEPTCONN: i32 = 0x0002;
pub const WS_SO_REUSEADDR: i32 = 0x0004;
pub const WS_SO_KEEPALIVE: i32 = 0x0008;
pub const WS_SO_DONTROUTE: i32 = 0x0010;
pub const WS_SO_BROADCAST: i32 = 0x0020;
pub const WS_SO_LINGER: i32 = 0x0080;
pub const WS_SO_OOBINLINE: i32 = 0x0100;
/// Unique to winsock; toggles lingering off with a boolean.
pub const WS_SO_DONTLINGER: i32 = 0xFF7F;
pub const WS_SO_SNDBUF: i32 = 0x1001;
pub const WS_SO_RCVBUF: i32 = 0x1002;
pub const WS_SO_SNDTIMEO: i32 = 0x1005;
pub const WS_SO_RCVTIMEO: i32 = 0x1006;
pub const WS_SO_ERROR: i32 = 0x1007;
pub const WS_SO_TYPE: i32 = 0x1008;

pub const WS_TCP_NODELAY: i32 = 0x0001;

/// Receive-buffer requests below this floor are accepted as no-ops instead
/// of being forwarded to the host. Compatibility behavior: applications
/// shrink SO_RCVBUF to absurd values and still expect working reads.
pub const SO_RCVBUF_FLOOR: i32 = 2048;

// ---------------------------------------------------------------------------
// ioctlsocket command codes
// ---------------------------------------------------------------------------

pub const WS_FIONREAD: u32 = 0x4004_667F;
pub const WS_FIONBIO: u32 = 0x8004_667E;
pub const WS_SIOCATMARK: u32 = 0x4004_7307;
/// The WinSock 1.1 async-I/O ioctl; always rejected.
pub const WS1_ASYNC_IOCTL: u32 = 0x8004_667D;

// ---------------------------------------------------------------------------
// Miscellaneous API constants
// ---------------------------------------------------------------------------

pub const INVALID_SOCKET: u32 = u32::MAX;
pub const SOCKET_ERROR: i32 = -1;

pub const WS_MAX_SOCKETS_PER_PROCESS: u16 = 128;
pub const WS_MAX_UDP_DATAGRAM: u16 = 1024;

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// Checks the address family of a socket-creation request.
///
/// Only the internet family (and unspecified, pending inference) are
/// supported; everything else fails before any host syscall.
#[must_use]
pub const fn check_family(family: i32) -> Result<(), i32> {
    match family {
        WS_AF_INET | WS_AF_UNSPEC => Ok(()),
        _ => Err(WSAEAFNOSUPPORT),
    }
}

/// Checks the socket type of a socket-creation request.
#[must_use]
pub const fn check_socket_type(stype: i32) -> Result<(), i32> {
    match stype {
        WS_SOCK_STREAM | WS_SOCK_DGRAM | WS_SOCK_RAW => Ok(()),
        _ => Err(WSAESOCKTNOSUPPORT),
    }
}

/// Resolves the effective address family for a creation request, inferring
/// it from the protocol when the caller passed `WS_AF_UNSPEC`.
///
/// Negative protocols are rejected outright; an unspecified family is only
/// accepted for the (TCP, stream) and (UDP, dgram) pairings.
#[must_use]
pub const fn infer_family(family: i32, stype: i32, protocol: i32) -> Result<i32, i32> {
    if protocol < 0 {
        return Err(WSAEPROTONOSUPPORT);
    }
    if family != WS_AF_UNSPEC {
        return Ok(family);
    }
    match (protocol, stype) {
        (WS_IPPROTO_TCP, WS_SOCK_STREAM) => Ok(WS_AF_INET),
        (WS_IPPROTO_UDP, WS_SOCK_DGRAM) => Ok(WS_AF_INET),
        _ => Err(WSAEPROTOTYPE),
    }
}

/// Returns `true` if `how` is a valid shutdown mode.
#[must_use]
pub const fn valid_shutdown_how(how: i32) -> bool {
    matches!(how, WS_SD_RECEIVE | WS_SD_SEND | WS_SD_BOTH)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
