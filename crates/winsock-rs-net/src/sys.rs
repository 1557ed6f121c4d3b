//! Thin host syscall wrappers.
//!
//! Every function captures the host errno on failure and returns it raw;
//! translation into the winsock namespace happens in the callers. Host
//! sockets are always created non-blocking; the Windows blocking default
//! is emulated above this layer, never delegated to the descriptor.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::RawFd;

/// Captures the errno of the immediately preceding failed syscall.
#[must_use]
pub fn host_errno() -> i32 {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EINVAL)
}

fn ret_fd(ret: libc::c_int) -> Result<RawFd, i32> {
    if ret < 0 { Err(host_errno()) } else { Ok(ret) }
}

fn ret_unit(ret: libc::c_int) -> Result<(), i32> {
    if ret < 0 { Err(host_errno()) } else { Ok(()) }
}

fn ret_size(ret: libc::ssize_t) -> Result<usize, i32> {
    if ret < 0 { Err(host_errno()) } else { Ok(ret as usize) }
}

// ---------------------------------------------------------------------------
// sockaddr conversion
// ---------------------------------------------------------------------------

/// Builds a host `sockaddr_in` from a v4 socket address.
#[must_use]
pub fn sockaddr_from_v4(addr: SocketAddrV4) -> libc::sockaddr_in {
    // SAFETY: sockaddr_in is plain old data; zeroing is a valid initializer.
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_port = addr.port().to_be();
    sa.sin_addr.s_addr = u32::from_ne_bytes(addr.ip().octets());
    sa
}

/// Reads a v4 socket address back out of a host `sockaddr_in`.
#[must_use]
pub fn v4_from_sockaddr(sa: &libc::sockaddr_in) -> SocketAddrV4 {
    let ip = Ipv4Addr::from(sa.sin_addr.s_addr.to_ne_bytes());
    SocketAddrV4::new(ip, u16::from_be(sa.sin_port))
}

// ---------------------------------------------------------------------------
// Socket lifecycle
// ---------------------------------------------------------------------------

pub fn socket(family: i32, stype: i32, protocol: i32) -> Result<RawFd, i32> {
    // SAFETY: plain integer arguments.
    ret_fd(unsafe {
        libc::socket(
            family,
            stype | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            protocol,
        )
    })
}

pub fn close(fd: RawFd) {
    // SAFETY: fd is owned by the caller; errors on close are unreportable.
    unsafe {
        libc::close(fd);
    }
}

pub fn bind(fd: RawFd, addr: SocketAddrV4) -> Result<(), i32> {
    let sa = sockaddr_from_v4(addr);
    // SAFETY: sa is a valid sockaddr_in for the length passed.
    ret_unit(unsafe {
        libc::bind(
            fd,
            (&raw const sa).cast::<libc::sockaddr>(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    })
}

pub fn connect(fd: RawFd, addr: SocketAddrV4) -> Result<(), i32> {
    let sa = sockaddr_from_v4(addr);
    // SAFETY: sa is a valid sockaddr_in for the length passed.
    ret_unit(unsafe {
        libc::connect(
            fd,
            (&raw const sa).cast::<libc::sockaddr>(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    })
}

pub fn listen(fd: RawFd, backlog: i32) -> Result<(), i32> {
    // SAFETY: plain integer arguments.
    ret_unit(unsafe { libc::listen(fd, backlog) })
}

/// Accepts one pending connection; the new descriptor is non-blocking.
pub fn accept(fd: RawFd) -> Result<(RawFd, Option<SocketAddrV4>), i32> {
    // SAFETY: sa/len describe caller-owned storage of matching size.
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let ret = unsafe {
        libc::accept4(
            fd,
            (&raw mut sa).cast::<libc::sockaddr>(),
            &raw mut len,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    };
    let new_fd = ret_fd(ret)?;
    let peer = if len as usize >= std::mem::size_of::<libc::sockaddr_in>()
        && sa.sin_family == libc::AF_INET as libc::sa_family_t
    {
        Some(v4_from_sockaddr(&sa))
    } else {
        None
    };
    Ok((new_fd, peer))
}

pub fn shutdown(fd: RawFd, how: i32) -> Result<(), i32> {
    // SAFETY: plain integer arguments.
    ret_unit(unsafe { libc::shutdown(fd, how) })
}

// ---------------------------------------------------------------------------
// I/O
// ---------------------------------------------------------------------------

pub fn recv(fd: RawFd, buf: &mut [u8], flags: i32) -> Result<usize, i32> {
    // SAFETY: buf is valid writable memory of the given length.
    ret_size(unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), flags) })
}

pub fn send(fd: RawFd, buf: &[u8], flags: i32) -> Result<usize, i32> {
    // MSG_NOSIGNAL: a dead peer must report as an error, not kill the
    // process with SIGPIPE.
    // SAFETY: buf is valid readable memory of the given length.
    ret_size(unsafe {
        libc::send(
            fd,
            buf.as_ptr().cast(),
            buf.len(),
            flags | libc::MSG_NOSIGNAL,
        )
    })
}

pub fn recv_from(fd: RawFd, buf: &mut [u8], flags: i32) -> Result<(usize, Option<SocketAddrV4>), i32> {
    // SAFETY: buf/sa/len all describe caller-owned storage.
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let ret = unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr().cast(),
            buf.len(),
            flags,
            (&raw mut sa).cast::<libc::sockaddr>(),
            &raw mut len,
        )
    };
    let n = ret_size(ret)?;
    let from = if sa.sin_family == libc::AF_INET as libc::sa_family_t {
        Some(v4_from_sockaddr(&sa))
    } else {
        None
    };
    Ok((n, from))
}

pub fn send_to(fd: RawFd, buf: &[u8], flags: i32, to: SocketAddrV4) -> Result<usize, i32> {
    let sa = sockaddr_from_v4(to);
    // SAFETY: buf and sa are valid for the lengths passed.
    ret_size(unsafe {
        libc::sendto(
            fd,
            buf.as_ptr().cast(),
            buf.len(),
            flags | libc::MSG_NOSIGNAL,
            (&raw const sa).cast::<libc::sockaddr>(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    })
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

pub fn getsockname(fd: RawFd) -> Result<SocketAddrV4, i32> {
    // SAFETY: sa/len describe caller-owned storage of matching size.
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    ret_unit(unsafe { libc::getsockname(fd, (&raw mut sa).cast(), &raw mut len) })?;
    Ok(v4_from_sockaddr(&sa))
}

pub fn getpeername(fd: RawFd) -> Result<SocketAddrV4, i32> {
    // SAFETY: sa/len describe caller-owned storage of matching size.
    let mut sa: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    ret_unit(unsafe { libc::getpeername(fd, (&raw mut sa).cast(), &raw mut len) })?;
    Ok(v4_from_sockaddr(&sa))
}

pub fn gethostname() -> Result<String, i32> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is writable for its full length.
    ret_unit(unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) })?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

// ---------------------------------------------------------------------------
// Options and ioctls
// ---------------------------------------------------------------------------

pub fn setsockopt_raw(fd: RawFd, level: i32, name: i32, value: &[u8]) -> Result<(), i32> {
    // SAFETY: value is valid readable memory of the given length.
    ret_unit(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value.as_ptr().cast(),
            value.len() as libc::socklen_t,
        )
    })
}

/// Reads an option into `value`, returning the host-reported length.
pub fn getsockopt_raw(fd: RawFd, level: i32, name: i32, value: &mut [u8]) -> Result<usize, i32> {
    let mut len = value.len() as libc::socklen_t;
    // SAFETY: value/len describe caller-owned storage.
    ret_unit(unsafe {
        libc::getsockopt(fd, level, name, value.as_mut_ptr().cast(), &raw mut len)
    })?;
    Ok(len as usize)
}

/// Snapshot of the socket's pending error (consumes it, as the host does).
#[must_use]
pub fn so_error(fd: RawFd) -> i32 {
    let mut value = 0i32;
    let mut len = std::mem::size_of::<i32>() as libc::socklen_t;
    // SAFETY: value/len describe caller-owned storage.
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            (&raw mut value).cast(),
            &raw mut len,
        )
    };
    if ret < 0 { 0 } else { value }
}

pub fn ioctl_arg(fd: RawFd, cmd: libc::c_ulong, arg: &mut i32) -> Result<(), i32> {
    // SAFETY: arg points to caller-owned storage for the ioctl result.
    ret_unit(unsafe { libc::ioctl(fd, cmd, arg as *mut i32) })
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

/// Waits for readiness on a descriptor set. `timeout_ms < 0` blocks
/// indefinitely. Returns the number of ready entries.
pub fn poll(fds: &mut [libc::pollfd], timeout_ms: i32) -> Result<usize, i32> {
    // SAFETY: fds is a valid pollfd slice of the given length.
    let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if ret < 0 { Err(host_errno()) } else { Ok(ret as usize) }
}

// ---------------------------------------------------------------------------
// Interface queries
// ---------------------------------------------------------------------------

fn ifreq_for(name: &[u8]) -> Option<libc::ifreq> {
    // SAFETY: ifreq is plain old data; zeroing is a valid initializer.
    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    if name.len() >= req.ifr_name.len() {
        return None;
    }
    for (dst, &src) in req.ifr_name.iter_mut().zip(name) {
        *dst = src as libc::c_char;
    }
    Some(req)
}

fn ifreq_addr_query(fd: RawFd, name: &[u8], cmd: libc::c_ulong) -> Result<Ipv4Addr, i32> {
    let mut req = ifreq_for(name).ok_or(libc::EINVAL)?;
    // SAFETY: req is a fully initialized ifreq.
    ret_unit(unsafe { libc::ioctl(fd, cmd, &raw mut req) })?;
    // SAFETY: the kernel filled the address union with a sockaddr_in for
    // AF_INET queries.
    let sa = unsafe { &*(&raw const req.ifr_ifru.ifru_addr).cast::<libc::sockaddr_in>() };
    Ok(Ipv4Addr::from(sa.sin_addr.s_addr.to_ne_bytes()))
}

pub fn interface_addr(fd: RawFd, name: &[u8]) -> Result<Ipv4Addr, i32> {
    ifreq_addr_query(fd, name, libc::SIOCGIFADDR)
}

pub fn interface_broadcast(fd: RawFd, name: &[u8]) -> Result<Ipv4Addr, i32> {
    ifreq_addr_query(fd, name, libc::SIOCGIFBRDADDR)
}

pub fn interface_netmask(fd: RawFd, name: &[u8]) -> Result<Ipv4Addr, i32> {
    ifreq_addr_query(fd, name, libc::SIOCGIFNETMASK)
}

pub fn interface_flags(fd: RawFd, name: &[u8]) -> Result<i32, i32> {
    let mut req = ifreq_for(name).ok_or(libc::EINVAL)?;
    // SAFETY: req is a fully initialized ifreq.
    ret_unit(unsafe { libc::ioctl(fd, libc::SIOCGIFFLAGS, &raw mut req) })?;
    // SAFETY: the kernel filled the flags member of the union.
    Ok(unsafe { req.ifr_ifru.ifru_flags } as i32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sockaddr_round_trip() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(192, 168, 7, 9), 8080);
        let sa = sockaddr_from_v4(addr);
        assert_eq!(sa.sin_family, libc::AF_INET as libc::sa_family_t);
        assert_eq!(u16::from_be(sa.sin_port), 8080);
        assert_eq!(v4_from_sockaddr(&sa), addr);
    }

    #[test]
    fn socket_is_created_nonblocking() {
        let fd = socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        // SAFETY: fd is a valid descriptor we just created.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        assert!(flags & libc::O_NONBLOCK != 0);
        close(fd);
    }

    #[test]
    fn so_error_on_fresh_socket_is_zero() {
        let fd = socket(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();
        assert_eq!(so_error(fd), 0);
        close(fd);
    }

    #[test]
    fn gethostname_is_nonempty() {
        let name = gethostname().unwrap();
        assert!(!name.is_empty());
    }
}
