//! Network interface enumeration.
//!
//! Interfaces come from the host's line-oriented device table
//! (`/proc/net/dev`); the address, broadcast, netmask, and flag details are
//! then queried per interface through the host interface ioctls on a
//! throwaway datagram socket.

use std::net::Ipv4Addr;

use log::{error, warn};

use crate::error::{SockError, SockResult};
use crate::sys;
use winsock_rs_core::error::WSAEINVAL;
use winsock_rs_core::ifcfg;

const PROCFS_NETDEV: &str = "/proc/net/dev";

/// One enumerated interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub addr: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub flags: i32,
}

/// Enumerates the host's network interfaces.
///
/// Any parse or query failure fails the whole enumeration, as the original
/// call did.
pub fn interface_list() -> SockResult<Vec<InterfaceInfo>> {
    let content = std::fs::read(PROCFS_NETDEV).map_err(|err| {
        error!("cannot read {PROCFS_NETDEV}: {err}");
        SockError::Unsupported(WSAEINVAL)
    })?;

    let count = ifcfg::interface_count(&content);
    let fd = sys::socket(libc::AF_INET, libc::SOCK_DGRAM, 0)
        .map_err(SockError::from_errno)?;

    let mut out = Vec::with_capacity(count);
    for index in 0..count {
        let Some(name) = ifcfg::interface_name(&content, index) else {
            warn!("interface table entry {index} is unparseable");
            sys::close(fd);
            return Err(SockError::Unsupported(WSAEINVAL));
        };

        let query = (|| -> Result<InterfaceInfo, i32> {
            Ok(InterfaceInfo {
                name: String::from_utf8_lossy(&name).into_owned(),
                addr: sys::interface_addr(fd, &name)?,
                broadcast: sys::interface_broadcast(fd, &name)?,
                netmask: sys::interface_netmask(fd, &name)?,
                flags: sys::interface_flags(fd, &name)?,
            })
        })();

        match query {
            Ok(info) => out.push(info),
            Err(errno) => {
                warn!(
                    "interface {:?} query failed (errno {errno})",
                    String::from_utf8_lossy(&name)
                );
                sys::close(fd);
                return Err(SockError::Unsupported(WSAEINVAL));
            }
        }
    }

    sys::close(fd);
    Ok(out)
}
