//! Wire socket-set translation and the select operation.
//!
//! `import` resolves each wire entry to its socket record; unresolvable
//! entries are recorded as absent without failing the whole import and can
//! never surface as ready. `export` compacts the wire sets in place to the
//! ready entries, reclassifying entries with a pending socket error into
//! the exception set when the caller asked for exception tracking.
//! `unimport` releases without touching the sets (the error/timeout path).
//! Every record resolved by `import` is released exactly once, by `export`
//! or by `unimport`.

use std::sync::Arc;
use std::time::Duration;

use log::trace;

use crate::error::{SockError, SockResult};
use crate::registry::{SockRecord, registry};
use crate::sys;
use winsock_rs_core::fdset::WireFdSet;

type Entries = Vec<Option<Arc<SockRecord>>>;

const READ_READY: i16 = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
const WRITE_READY: i16 = libc::POLLOUT | libc::POLLERR;
const EXCEPT_READY: i16 = libc::POLLPRI;

/// Resolves every entry of a wire set, keeping position alignment.
fn import(set: Option<&WireFdSet>) -> Option<Entries> {
    set.map(|s| {
        s.handles()
            .iter()
            .map(|&handle| registry().resolve(handle).ok())
            .collect()
    })
}

/// Releases resolved records without mutating the wire sets.
fn unimport(imports: [Option<Entries>; 3]) {
    drop(imports);
}

/// Compacts one wire set to its ready entries.
///
/// With `diverted` present (exception tracking requested), a ready entry
/// whose socket carries a pending error is moved out of this set and its
/// handle recorded for the exception set instead.
fn export_class(
    set: &mut WireFdSet,
    entries: &Entries,
    revents: &[i16],
    ready_mask: i16,
    mut diverted: Option<&mut Vec<u32>>,
) -> usize {
    let handles: Vec<u32> = set.handles().to_vec();
    let mut keep = vec![false; handles.len()];
    let mut kept = 0;

    for (pos, entry) in entries.iter().enumerate() {
        let Some(record) = entry else {
            continue;
        };
        if revents[pos] & ready_mask == 0 {
            continue;
        }
        if let Some(divert) = diverted.as_mut() {
            if sys::so_error(record.fd()) != 0 {
                divert.push(handles[pos]);
                continue;
            }
        }
        keep[pos] = true;
        kept += 1;
    }

    set.retain_positions(|pos| keep[pos]);
    kept
}

fn timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(d) => i32::try_from(d.as_millis()).unwrap_or(i32::MAX),
    }
}

/// The readiness-multiplexing operation over wire socket sets.
///
/// Imports all three sets, waits on the host with the caller's timeout
/// (zero polls, `None` blocks indefinitely), then exports results. A
/// zero-readiness outcome clears all three counts and returns 0; a wait
/// error clears the counts and maps through the error translator; a
/// positive outcome returns the total ready entries after exception
/// reclassification.
pub fn select(
    mut read: Option<&mut WireFdSet>,
    mut write: Option<&mut WireFdSet>,
    mut except: Option<&mut WireFdSet>,
    timeout: Option<Duration>,
) -> SockResult<usize> {
    let read_imp = import(read.as_deref());
    let write_imp = import(write.as_deref());
    let except_imp = import(except.as_deref());

    // One poll entry per resolved position, remembering where it came from.
    let mut pollfds: Vec<libc::pollfd> = Vec::new();
    let mut origin: Vec<(usize, usize)> = Vec::new();
    let class_interest = [libc::POLLIN, libc::POLLOUT, libc::POLLPRI];
    for (class, imp) in [&read_imp, &write_imp, &except_imp].into_iter().enumerate() {
        if let Some(entries) = imp {
            for (pos, entry) in entries.iter().enumerate() {
                if let Some(record) = entry {
                    pollfds.push(libc::pollfd {
                        fd: record.fd(),
                        events: class_interest[class],
                        revents: 0,
                    });
                    origin.push((class, pos));
                }
            }
        }
    }

    let clear_all = |read: &mut Option<&mut WireFdSet>,
                     write: &mut Option<&mut WireFdSet>,
                     except: &mut Option<&mut WireFdSet>| {
        if let Some(set) = read {
            set.clear();
        }
        if let Some(set) = write {
            set.clear();
        }
        if let Some(set) = except {
            set.clear();
        }
    };

    let ready = match sys::poll(&mut pollfds, timeout_ms(timeout)) {
        Err(errno) => {
            unimport([read_imp, write_imp, except_imp]);
            clear_all(&mut read, &mut write, &mut except);
            return Err(SockError::from_errno(errno));
        }
        Ok(n) => n,
    };

    if ready == 0 {
        unimport([read_imp, write_imp, except_imp]);
        clear_all(&mut read, &mut write, &mut except);
        return Ok(0);
    }

    // Scatter poll results back onto (class, position).
    let lengths = [
        read_imp.as_ref().map_or(0, Vec::len),
        write_imp.as_ref().map_or(0, Vec::len),
        except_imp.as_ref().map_or(0, Vec::len),
    ];
    let mut revents = [
        vec![0i16; lengths[0]],
        vec![0i16; lengths[1]],
        vec![0i16; lengths[2]],
    ];
    for (pollfd, &(class, pos)) in pollfds.iter().zip(&origin) {
        revents[class][pos] = pollfd.revents;
    }

    let mut diverted: Vec<u32> = Vec::new();
    let track_exceptions = except.is_some();
    let mut total = 0;

    if let (Some(set), Some(entries)) = (read.as_deref_mut(), &read_imp) {
        total += export_class(
            set,
            entries,
            &revents[0],
            READ_READY,
            track_exceptions.then_some(&mut diverted),
        );
    }
    if let (Some(set), Some(entries)) = (write.as_deref_mut(), &write_imp) {
        total += export_class(
            set,
            entries,
            &revents[1],
            WRITE_READY,
            track_exceptions.then_some(&mut diverted),
        );
    }
    if let (Some(set), Some(entries)) = (except.as_deref_mut(), &except_imp) {
        total += export_class(set, entries, &revents[2], EXCEPT_READY, None);
        // Reclassified entries join the exception set and count as ready.
        for handle in diverted.drain(..) {
            if !set.contains(handle) && set.push(handle) {
                total += 1;
            }
        }
    }

    unimport([read_imp, write_imp, except_imp]);
    trace!("select: {total} ready");
    Ok(total)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use winsock_rs_core::fdset::SetFormat;

    fn udp_pair() -> (u32, SocketAddrV4, u32) {
        let reg = registry();
        let a = reg
            .create_socket(libc::AF_INET, libc::SOCK_DGRAM, 0)
            .unwrap();
        let b = reg
            .create_socket(libc::AF_INET, libc::SOCK_DGRAM, 0)
            .unwrap();
        let rec_a = reg.resolve(a).unwrap();
        sys::bind(rec_a.fd(), SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr_a = sys::getsockname(rec_a.fd()).unwrap();
        (a, addr_a, b)
    }

    #[test]
    fn zero_timeout_poll_on_idle_socket_clears_sets() {
        let (a, _addr, b) = udp_pair();
        let mut read = WireFdSet::with_handles(SetFormat::Wide, &[a]).unwrap();
        let n = select(
            Some(&mut read),
            None,
            None,
            Some(Duration::from_millis(0)),
        )
        .unwrap();
        assert_eq!(n, 0);
        assert_eq!(read.count(), 0);
        registry().close_socket(a).unwrap();
        registry().close_socket(b).unwrap();
    }

    #[test]
    fn readable_socket_is_exported() {
        let (a, addr_a, b) = udp_pair();
        let rec_b = registry().resolve(b).unwrap();
        sys::send_to(rec_b.fd(), b"ping", 0, addr_a).unwrap();

        let mut read = WireFdSet::with_handles(SetFormat::Wide, &[a]).unwrap();
        let n = select(Some(&mut read), None, None, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(n, 1);
        assert_eq!(read.handles(), &[a]);
        registry().close_socket(a).unwrap();
        registry().close_socket(b).unwrap();
    }

    #[test]
    fn unresolvable_entry_is_never_marked_ready() {
        let (a, addr_a, b) = udp_pair();
        let rec_b = registry().resolve(b).unwrap();
        sys::send_to(rec_b.fd(), b"ping", 0, addr_a).unwrap();

        let bogus = 0xDEAD_0000u32;
        let mut read = WireFdSet::with_handles(SetFormat::Wide, &[bogus, a]).unwrap();
        let n = select(Some(&mut read), None, None, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(n, 1);
        assert!(!read.contains(bogus));
        assert!(read.contains(a));
        registry().close_socket(a).unwrap();
        registry().close_socket(b).unwrap();
    }

    #[test]
    fn unimport_releases_exactly_the_resolved_entries() {
        let (a, _addr, b) = udp_pair();
        let record = registry().resolve(a).unwrap();
        let before = Arc::strong_count(&record);

        let set = WireFdSet::with_handles(SetFormat::Wide, &[a, 0xBAD0_0000, a]).unwrap();
        let imports = import(Some(&set)).unwrap();
        assert_eq!(imports.iter().filter(|e| e.is_some()).count(), 2);
        assert_eq!(Arc::strong_count(&record), before + 2);

        unimport([Some(imports), None, None]);
        assert_eq!(Arc::strong_count(&record), before);
        registry().close_socket(a).unwrap();
        registry().close_socket(b).unwrap();
    }

    #[test]
    fn writable_udp_socket_reports_in_write_set() {
        let (a, _addr, b) = udp_pair();
        let mut write = WireFdSet::with_handles(SetFormat::Wide, &[b]).unwrap();
        let n = select(None, Some(&mut write), None, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(n, 1);
        assert!(write.contains(b));
        registry().close_socket(a).unwrap();
        registry().close_socket(b).unwrap();
    }
}
