//! Startup version negotiation.

use crate::error::WSAVERNOTSUPPORTED;
use crate::sockdef::{WS_MAX_SOCKETS_PER_PROCESS, WS_MAX_UDP_DATAGRAM};

/// Highest sockets specification this layer implements.
pub const WS_VERSION: u16 = 0x0202;

/// Implementation metadata returned from a successful startup, the
/// WSADATA-equivalent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsaData {
    /// Version the caller should use (negotiated).
    pub version: u16,
    /// Highest version the implementation supports.
    pub high_version: u16,
    pub description: &'static str,
    pub system_status: &'static str,
    pub max_sockets: u16,
    pub max_udp_dg: u16,
}

const SYSTEM_STATUS: &str = if cfg!(target_os = "linux") {
    "Linux"
} else if cfg!(target_os = "freebsd") {
    "FreeBSD"
} else if cfg!(target_os = "openbsd") {
    "OpenBSD"
} else {
    "Unknown"
};

/// Negotiates the sockets specification version.
///
/// The version word carries the major in the low byte and the minor in the
/// high byte. Any major >= 1 is accepted; the negotiated version is the
/// caller's request capped at [`WS_VERSION`].
#[must_use]
pub fn negotiate(requested: u16) -> Result<WsaData, i32> {
    let major = requested & 0x00FF;
    if major < 1 {
        return Err(WSAVERNOTSUPPORTED);
    }
    let version = if major > 2 { WS_VERSION } else { requested };
    Ok(WsaData {
        version,
        high_version: WS_VERSION,
        description: "winsock-rs Sockets 2.0",
        system_status: SYSTEM_STATUS,
        max_sockets: WS_MAX_SOCKETS_PER_PROCESS,
        max_udp_dg: WS_MAX_UDP_DATAGRAM,
    })
}
