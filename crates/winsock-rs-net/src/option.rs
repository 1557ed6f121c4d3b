//! Socket option and ioctl translation.
//!
//! Table-driven, bidirectional, and scoped to an explicit set of supported
//! levels. An unknown (level, option) pair is a firm failure before any
//! host syscall, never a best-effort pass-through.

use log::warn;

use crate::error::{SockError, SockResult};
use winsock_rs_core::error::{WSAEFAULT, WSAEINVAL, WSAENOPROTOOPT, WSAEOPNOTSUPP};
use winsock_rs_core::sockdef::{
    SO_RCVBUF_FLOOR, WS1_ASYNC_IOCTL, WS_FIONBIO, WS_FIONREAD, WS_IPPROTO_TCP, WS_SIOCATMARK,
    WS_SOL_SOCKET, WS_SO_BROADCAST, WS_SO_DEBUG, WS_SO_DONTLINGER, WS_SO_DONTROUTE, WS_SO_ERROR,
    WS_SO_KEEPALIVE, WS_SO_LINGER, WS_SO_OOBINLINE, WS_SO_RCVBUF, WS_SO_RCVTIMEO, WS_SO_REUSEADDR,
    WS_SO_SNDBUF, WS_SO_SNDTIMEO, WS_SO_TYPE, WS_TCP_NODELAY,
};

// ---------------------------------------------------------------------------
// Translation tables
// ---------------------------------------------------------------------------

// Paired (windows, host) tables per supported level. Timeout options are
// host-gated in principle; every unix target this builds on exposes them.
const SOCKET_LEVEL_OPTS: &[(i32, i32)] = &[
    (WS_SO_DEBUG, libc::SO_DEBUG),
    (WS_SO_REUSEADDR, libc::SO_REUSEADDR),
    (WS_SO_KEEPALIVE, libc::SO_KEEPALIVE),
    (WS_SO_DONTROUTE, libc::SO_DONTROUTE),
    (WS_SO_BROADCAST, libc::SO_BROADCAST),
    (WS_SO_LINGER, libc::SO_LINGER),
    (WS_SO_OOBINLINE, libc::SO_OOBINLINE),
    (WS_SO_SNDBUF, libc::SO_SNDBUF),
    (WS_SO_RCVBUF, libc::SO_RCVBUF),
    (WS_SO_ERROR, libc::SO_ERROR),
    (WS_SO_TYPE, libc::SO_TYPE),
    (WS_SO_RCVTIMEO, libc::SO_RCVTIMEO),
    (WS_SO_SNDTIMEO, libc::SO_SNDTIMEO),
];

const TCP_LEVEL_OPTS: &[(i32, i32)] = &[(WS_TCP_NODELAY, libc::TCP_NODELAY)];

/// Maps a Windows (level, option) pair to the host pair.
#[must_use]
pub fn translate_option(level: i32, name: i32) -> Option<(i32, i32)> {
    match level {
        WS_SOL_SOCKET => SOCKET_LEVEL_OPTS
            .iter()
            .find(|(ws, _)| *ws == name)
            .map(|&(_, host)| (libc::SOL_SOCKET, host)),
        WS_IPPROTO_TCP => TCP_LEVEL_OPTS
            .iter()
            .find(|(ws, _)| *ws == name)
            .map(|&(_, host)| (libc::IPPROTO_TCP, host)),
        _ => None,
    }
}

/// Reverse lookup: recovers the Windows pair from a host pair.
#[must_use]
pub fn reverse_option(host_level: i32, host_name: i32) -> Option<(i32, i32)> {
    if host_level == libc::SOL_SOCKET {
        SOCKET_LEVEL_OPTS
            .iter()
            .find(|(_, host)| *host == host_name)
            .map(|&(ws, _)| (WS_SOL_SOCKET, ws))
    } else if host_level == libc::IPPROTO_TCP {
        TCP_LEVEL_OPTS
            .iter()
            .find(|(_, host)| *host == host_name)
            .map(|&(ws, _)| (WS_IPPROTO_TCP, ws))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// setsockopt payload conversion
// ---------------------------------------------------------------------------

/// What the adapter decided to do with a set-option request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetoptAction {
    /// Accepted without reaching the host.
    Noop,
    /// Forward to the host with the translated pair and payload.
    Apply {
        level: i32,
        name: i32,
        value: Vec<u8>,
    },
}

fn opt_int(value: &[u8]) -> SockResult<i32> {
    match value.len() {
        0 | 1 => Err(SockError::Unsupported(WSAEFAULT)),
        2 | 3 => Ok(i32::from(i16::from_ne_bytes([value[0], value[1]]))),
        _ => Ok(i32::from_ne_bytes([value[0], value[1], value[2], value[3]])),
    }
}

fn linger_bytes(l_onoff: i32, l_linger: i32) -> Vec<u8> {
    // struct linger is two native ints back to back.
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&l_onoff.to_ne_bytes());
    out.extend_from_slice(&l_linger.to_ne_bytes());
    out
}

/// Decides how a set-option request reaches the host, applying the
/// structural special cases.
pub fn prepare_setsockopt(level: i32, name: i32, value: &[u8]) -> SockResult<SetoptAction> {
    // Privileged and useless; accept and ignore.
    if level == WS_SOL_SOCKET && name == WS_SO_DEBUG {
        warn!("SO_DEBUG requested; accepted as a no-op (privileged)");
        return Ok(SetoptAction::Noop);
    }

    // The linger toggle takes a boolean and inverts it into a zero-duration
    // host linger.
    if level == WS_SOL_SOCKET && name == WS_SO_DONTLINGER {
        let onoff = if opt_int(value)? != 0 { 0 } else { 1 };
        return Ok(SetoptAction::Apply {
            level: libc::SOL_SOCKET,
            name: libc::SO_LINGER,
            value: linger_bytes(onoff, 0),
        });
    }

    let (host_level, host_name) =
        translate_option(level, name).ok_or(SockError::Unsupported(WSAENOPROTOOPT))?;

    // The linger value is two packed 16-bit fields in both caller ABIs,
    // reinterpreted as the host's linger structure.
    if host_level == libc::SOL_SOCKET && host_name == libc::SO_LINGER {
        if value.len() < 4 {
            return Err(SockError::Unsupported(WSAEFAULT));
        }
        let onoff = u16::from_ne_bytes([value[0], value[1]]);
        let linger = u16::from_ne_bytes([value[2], value[3]]);
        return Ok(SetoptAction::Apply {
            level: host_level,
            name: host_name,
            value: linger_bytes(i32::from(onoff), i32::from(linger)),
        });
    }

    let wide = opt_int(value)?;

    // Undersized receive-buffer requests succeed without reaching the
    // host; applications depend on this.
    if host_level == libc::SOL_SOCKET && host_name == libc::SO_RCVBUF && wide < SO_RCVBUF_FLOOR {
        warn!("SO_RCVBUF for {wide} bytes is below the floor: ignored");
        return Ok(SetoptAction::Noop);
    }

    // Narrow payloads widen to the host's native int.
    let value = if value.len() < 4 {
        wide.to_ne_bytes().to_vec()
    } else {
        value.to_vec()
    };

    Ok(SetoptAction::Apply {
        level: host_level,
        name: host_name,
        value,
    })
}

// ---------------------------------------------------------------------------
// ioctl translation
// ---------------------------------------------------------------------------

/// Supported ioctl commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlCmd {
    /// Toggle the emulated blocking mode; never reaches the host.
    Nbio,
    /// Bytes available to read.
    Nread,
    /// Out-of-band mark test.
    AtMark,
}

/// Maps a Windows ioctl code to a supported command. Anything outside the
/// enumerated set is a firm failure.
pub fn translate_ioctl(cmd: u32) -> SockResult<IoctlCmd> {
    match cmd {
        WS_FIONBIO => Ok(IoctlCmd::Nbio),
        WS_FIONREAD => Ok(IoctlCmd::Nread),
        WS_SIOCATMARK => Ok(IoctlCmd::AtMark),
        WS1_ASYNC_IOCTL => Err(SockError::Unsupported(WSAEINVAL)),
        _ => {
            warn!("unsupported ioctl command {cmd:#010x}");
            Err(SockError::Unsupported(WSAEOPNOTSUPP))
        }
    }
}

/// Host `SIOCATMARK` ioctl request code. The `libc` crate does not export this
/// constant for Linux targets, so it is spelled out here from the platform ABI.
const SIOCATMARK: libc::c_ulong = 0x8905;

/// Host request code for a command that does reach the host.
#[must_use]
pub fn host_ioctl_code(cmd: IoctlCmd) -> libc::c_ulong {
    match cmd {
        IoctlCmd::Nread => libc::FIONREAD as libc::c_ulong,
        IoctlCmd::AtMark => SIOCATMARK,
        // Blocking mode is emulated; there is no host code to give.
        IoctlCmd::Nbio => unreachable!("FIONBIO never reaches the host"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
