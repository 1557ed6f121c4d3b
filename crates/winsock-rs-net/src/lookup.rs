//! Directory lookups over the files backend.
//!
//! Host, protocol, and service queries resolve against the host databases
//! (`/etc/hosts`, `/etc/protocols`, `/etc/services`), with numeric fast
//! paths where the original APIs had them. Results come back either as
//! typed records or marshalled into the caller's chosen pointer encoding.
//! Marshalling stages through a thread-local scratch, so lookups from
//! different threads never contend.

use std::cell::RefCell;
use std::net::Ipv4Addr;

use log::warn;

use crate::error::{SockError, SockResult};
use winsock_rs_core::dirrec::{
    HostRecord, ProtoRecord, PtrEncoding, Scratch, ServRecord, serialize_host, serialize_proto,
    serialize_serv,
};
use winsock_rs_core::error::{WSAEFAULT, WSAHOST_NOT_FOUND, WSANO_DATA};
use winsock_rs_core::netdb;
use winsock_rs_core::sockdef::WS_AF_INET;

const ETC_HOSTS: &str = "/etc/hosts";
const ETC_PROTOCOLS: &str = "/etc/protocols";
const ETC_SERVICES: &str = "/etc/services";

thread_local! {
    static HOST_SCRATCH: RefCell<Scratch> = RefCell::new(Scratch::new());
    static PROTO_SCRATCH: RefCell<Scratch> = RefCell::new(Scratch::new());
    static SERV_SCRATCH: RefCell<Scratch> = RefCell::new(Scratch::new());
}

/// An unreadable database reads as empty: the lookup simply misses.
fn db_content(path: &str) -> Vec<u8> {
    std::fs::read(path).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Typed lookups
// ---------------------------------------------------------------------------

/// Host lookup by name. Literal addresses short-circuit without touching
/// the database.
pub fn host_by_name(name: &str) -> SockResult<HostRecord> {
    if let Ok(literal) = name.parse::<Ipv4Addr>() {
        return Ok(HostRecord {
            name: name.as_bytes().to_vec(),
            aliases: Vec::new(),
            addrtype: WS_AF_INET as i16,
            addr_len: 4,
            addrs: vec![literal.octets().to_vec()],
        });
    }
    netdb::hosts_by_name(&db_content(ETC_HOSTS), name.as_bytes())
        .ok_or(SockError::Resolver(WSAHOST_NOT_FOUND))
}

/// Reverse host lookup by v4 address.
pub fn host_by_addr(addr: Ipv4Addr) -> SockResult<HostRecord> {
    netdb::hosts_by_addr(&db_content(ETC_HOSTS), addr)
        .ok_or(SockError::Resolver(WSAHOST_NOT_FOUND))
}

pub fn proto_by_name(name: &str) -> SockResult<ProtoRecord> {
    netdb::proto_by_name(&db_content(ETC_PROTOCOLS), name.as_bytes()).ok_or_else(|| {
        warn!("protocol {name:?} not found; is it listed in {ETC_PROTOCOLS}?");
        SockError::Resolver(WSANO_DATA)
    })
}

pub fn proto_by_number(number: i16) -> SockResult<ProtoRecord> {
    netdb::proto_by_number(&db_content(ETC_PROTOCOLS), number).ok_or_else(|| {
        warn!("protocol number {number} not found; is it listed in {ETC_PROTOCOLS}?");
        SockError::Resolver(WSANO_DATA)
    })
}

pub fn serv_by_name(name: &str, proto: Option<&str>) -> SockResult<ServRecord> {
    netdb::serv_by_name(
        &db_content(ETC_SERVICES),
        name.as_bytes(),
        proto.map(str::as_bytes),
    )
    .ok_or_else(|| {
        warn!("service {name:?} not found; is it listed in {ETC_SERVICES}?");
        SockError::Resolver(WSANO_DATA)
    })
}

/// Service lookup by port in network byte order.
pub fn serv_by_port(port_net: u16, proto: Option<&str>) -> SockResult<ServRecord> {
    netdb::serv_by_port(&db_content(ETC_SERVICES), port_net, proto.map(str::as_bytes)).ok_or_else(
        || {
            warn!(
                "service on port {} not found; is it listed in {ETC_SERVICES}?",
                u16::from_be(port_net)
            );
            SockError::Resolver(WSANO_DATA)
        },
    )
}

// ---------------------------------------------------------------------------
// Marshalled lookups
// ---------------------------------------------------------------------------

/// Marshals a host record through the thread-local scratch.
pub fn marshal_host(rec: &HostRecord, enc: PtrEncoding) -> SockResult<Vec<u8>> {
    HOST_SCRATCH.with(|cell| {
        let mut scratch = cell.borrow_mut();
        let size = serialize_host(rec, enc, &mut scratch);
        if size == 0 {
            return Err(SockError::NoBuffers);
        }
        Ok(scratch.bytes()[..size].to_vec())
    })
}

pub fn marshal_proto(rec: &ProtoRecord, enc: PtrEncoding) -> SockResult<Vec<u8>> {
    PROTO_SCRATCH.with(|cell| {
        let mut scratch = cell.borrow_mut();
        let size = serialize_proto(rec, enc, &mut scratch);
        if size == 0 {
            return Err(SockError::NoBuffers);
        }
        Ok(scratch.bytes()[..size].to_vec())
    })
}

pub fn marshal_serv(rec: &ServRecord, enc: PtrEncoding) -> SockResult<Vec<u8>> {
    SERV_SCRATCH.with(|cell| {
        let mut scratch = cell.borrow_mut();
        let size = serialize_serv(rec, enc, &mut scratch);
        if size == 0 {
            return Err(SockError::NoBuffers);
        }
        Ok(scratch.bytes()[..size].to_vec())
    })
}

// ---------------------------------------------------------------------------
// Host name
// ---------------------------------------------------------------------------

pub fn gethostname() -> SockResult<String> {
    crate::sys::gethostname().map_err(|errno| {
        if errno == libc::EINVAL {
            SockError::Transport(WSAEFAULT)
        } else {
            SockError::from_errno(errno)
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
