//! The socket handle registry.
//!
//! Descendant of the out-of-process handle server: one process-wide table
//! owning every socket. A handle is an opaque token, never a descriptor;
//! the record behind it owns the sole host descriptor for the socket's
//! lifetime. All readiness state, notification registrations, and per-event
//! errors live in the record and are mutated only through the explicit
//! request operations below.

use std::collections::HashMap;
use std::net::SocketAddrV4;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use log::{error, trace, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{SockError, SockResult};
use crate::event::{MessageSink, WsEvent};
use crate::reactor;
use crate::sys;
use winsock_rs_core::events::{
    FD_ACCEPT, FD_CLOSE, FD_MAX_EVENTS, FD_READ, FD_SERVICE, FD_WRITE, ST_ACCEPT_PENDING,
    ST_CONNECTED, ST_NONBLOCKING,
};
use winsock_rs_core::state::SocketPhase;

/// Opaque socket identifier issued by the registry. Zero is never issued,
/// which the accept queue relies on.
pub type SocketHandle = u32;

// ---------------------------------------------------------------------------
// Per-socket state
// ---------------------------------------------------------------------------

/// A message-based notification registration.
#[derive(Clone)]
pub(crate) struct AsyncReg {
    pub sink: Arc<dyn MessageSink>,
    pub msg: u32,
    pub mask: u32,
}

pub(crate) struct SockState {
    /// Mode and readiness flags (`ST_*`).
    pub status: u32,
    /// Abstract lifecycle phase.
    pub phase: SocketPhase,
    /// Events currently armed for reporting. Reporting disarms a bit;
    /// operations re-arm it (recv re-arms READ, and so on).
    pub armed: u32,
    /// Events reported but not yet consumed.
    pub pending: u32,
    /// Per-event error snapshots, indexed by event bit.
    pub errors: [i32; FD_MAX_EVENTS],
    /// Event object signaled on readiness changes, with its interest mask.
    pub event: Option<Arc<WsEvent>>,
    pub event_mask: u32,
    /// Message-based registration; dispatch consumes `pending` for these.
    pub async_reg: Option<AsyncReg>,
}

impl SockState {
    fn new(phase: SocketPhase, status: u32, armed: u32) -> Self {
        Self {
            status,
            phase,
            armed,
            pending: 0,
            errors: [0; FD_MAX_EVENTS],
            event: None,
            event_mask: 0,
            async_reg: None,
        }
    }
}

/// One live socket. Owns the host descriptor.
pub struct SockRecord {
    handle: SocketHandle,
    fd: RawFd,
    pub(crate) state: Mutex<SockState>,
}

impl std::fmt::Debug for SockRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SockRecord")
            .field("handle", &self.handle)
            .field("fd", &self.fd)
            .finish_non_exhaustive()
    }
}

impl SockRecord {
    #[must_use]
    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    #[must_use]
    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for SockRecord {
    fn drop(&mut self) {
        sys::close(self.fd);
    }
}

// ---------------------------------------------------------------------------
// Accept queue
// ---------------------------------------------------------------------------

/// Capacity of the deferred-notification ring for accepted sockets.
pub(crate) const ACCEPT_QUEUE_LEN: usize = 6;

/// Fixed ring pairing a not-yet-notified listener with its freshly accepted
/// socket. A slot is claimed by a single compare-and-swap on the listener
/// word, so two concurrent accepts can never collide on one slot. Only the
/// service thread drains.
pub(crate) struct AcceptQueue {
    old: [AtomicU32; ACCEPT_QUEUE_LEN],
    new: [AtomicU32; ACCEPT_QUEUE_LEN],
}

impl AcceptQueue {
    const fn new() -> Self {
        // No const array-init for atomics without a const item.
        const ZERO: AtomicU32 = AtomicU32::new(0);
        Self {
            old: [ZERO; ACCEPT_QUEUE_LEN],
            new: [ZERO; ACCEPT_QUEUE_LEN],
        }
    }

    /// Claims a free slot for (listener, accepted). Returns the slot index,
    /// or `None` when the ring is full.
    pub fn claim(&self, listener: SocketHandle, accepted: SocketHandle) -> Option<usize> {
        for q in 0..ACCEPT_QUEUE_LEN {
            if self.old[q]
                .compare_exchange(0, listener, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.new[q].store(accepted, Ordering::Release);
                return Some(q);
            }
        }
        None
    }

    /// Takes every fully published entry for `listener`. Entries whose
    /// accepted handle has not been stored yet are left for the next cycle.
    pub fn drain(&self, listener: SocketHandle, mut f: impl FnMut(SocketHandle)) {
        for q in 0..ACCEPT_QUEUE_LEN {
            if self.old[q].load(Ordering::Acquire) != listener {
                continue;
            }
            let accepted = self.new[q].swap(0, Ordering::AcqRel);
            if accepted != 0 {
                self.old[q].store(0, Ordering::Release);
                f(accepted);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct Registry {
    sockets: RwLock<HashMap<SocketHandle, Arc<SockRecord>>>,
    next_handle: AtomicU32,
    pub(crate) accept_queue: AcceptQueue,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        sockets: RwLock::new(HashMap::new()),
        // Handles look nothing like descriptors on purpose.
        next_handle: AtomicU32::new(0x0004_0000),
        accept_queue: AcceptQueue::new(),
    })
}

impl Registry {
    fn insert(&self, fd: RawFd, state: SockState) -> Arc<SockRecord> {
        let handle = self.next_handle.fetch_add(4, Ordering::SeqCst);
        let record = Arc::new(SockRecord {
            handle,
            fd,
            state: Mutex::new(state),
        });
        self.sockets.write().insert(handle, Arc::clone(&record));
        record
    }

    /// Creates a host socket and issues a handle for it.
    pub fn create_socket(&self, family: i32, stype: i32, protocol: i32) -> SockResult<SocketHandle> {
        let fd = sys::socket(family, stype, protocol).map_err(SockError::from_errno)?;
        let record = self.insert(fd, SockState::new(SocketPhase::Unbound, 0, 0));
        trace!("created socket {:#x} (fd {fd})", record.handle());
        Ok(record.handle())
    }

    /// Accepts a pending connection on a listening socket, issuing a handle
    /// for the new connection. The child starts out connected with the
    /// connected-socket event set armed.
    pub fn accept_socket(
        &self,
        listener: &Arc<SockRecord>,
    ) -> SockResult<(SocketHandle, Option<SocketAddrV4>)> {
        let (fd, peer) = sys::accept(listener.fd()).map_err(SockError::from_errno)?;
        {
            // Taking a connection re-arms accept reporting on the listener.
            let mut state = listener.state.lock();
            state.armed |= FD_ACCEPT;
            state.status &= !ST_ACCEPT_PENDING;
        }
        let state = SockState::new(SocketPhase::Connected, ST_CONNECTED, CONNECTED_ARM);
        let record = self.insert(fd, state);
        trace!(
            "accepted socket {:#x} from listener {:#x}",
            record.handle(),
            listener.handle()
        );
        Ok((record.handle(), peer))
    }

    /// Resolves a handle to its record. Invalid handles are "not a socket".
    pub fn resolve(&self, handle: SocketHandle) -> SockResult<Arc<SockRecord>> {
        match self.sockets.read().get(&handle) {
            Some(record) => Ok(Arc::clone(record)),
            None => {
                warn!("handle {handle:#x} is not a socket");
                Err(SockError::NotSocket)
            }
        }
    }

    /// Removes a socket from the table. The descriptor closes when the last
    /// guard drops; an active message registration receives one synthetic
    /// terminal notification from the service thread and is then released.
    pub fn close_socket(&self, handle: SocketHandle) -> SockResult<()> {
        let record = self
            .sockets
            .write()
            .remove(&handle)
            .ok_or(SockError::NotSocket)?;
        let orphan = {
            let mut state = record.state.lock();
            state.phase = SocketPhase::Closed;
            if let Some(event) = state.event.take() {
                event.set();
            }
            state.async_reg.take()
        };
        if let Some(reg) = orphan {
            reactor::push_orphan(handle, reg);
        }
        trace!("closed socket {handle:#x}");
        Ok(())
    }

    // -- Socket event requests ----------------------------------------------

    /// Reads the pending event mask and per-event errors. With `service`
    /// set the pending mask is consumed and the associated event object
    /// reset, which is how the enumerate operation behaves.
    pub fn get_socket_event(
        &self,
        handle: SocketHandle,
        service: bool,
    ) -> SockResult<(u32, [i32; FD_MAX_EVENTS])> {
        let record = self.resolve(handle)?;
        let mut state = record.state.lock();
        let pending = state.pending & !FD_SERVICE;
        let errors = state.errors;
        if service {
            state.pending &= FD_SERVICE;
            if let Some(event) = &state.event {
                event.reset();
            }
        }
        Ok((pending, errors))
    }

    /// Associates (or clears) an event object and interest mask.
    pub fn set_socket_event(
        &self,
        handle: SocketHandle,
        event: Option<Arc<WsEvent>>,
        mask: u32,
    ) -> SockResult<()> {
        let record = self.resolve(handle)?;
        {
            let mut state = record.state.lock();
            state.event = event;
            state.event_mask = mask;
            state.armed |= mask;
        }
        reactor::ensure_started();
        reactor::wake();
        Ok(())
    }

    /// Installs or cancels a message-based registration. Registration
    /// implies interest in the internal service event so accepted children
    /// can inherit at dispatch time.
    pub fn set_async_select(
        &self,
        handle: SocketHandle,
        reg: Option<(Arc<dyn MessageSink>, u32)>,
        mask: u32,
    ) -> SockResult<()> {
        let record = self.resolve(handle)?;
        {
            let mut state = record.state.lock();
            match reg {
                Some((sink, msg)) => {
                    state.async_reg = Some(AsyncReg { sink, msg, mask });
                    state.event_mask = mask | FD_SERVICE;
                    state.armed |= mask | FD_SERVICE;
                }
                None => {
                    state.async_reg = None;
                    state.event = None;
                    state.event_mask = 0;
                }
            }
        }
        reactor::ensure_started();
        reactor::wake();
        Ok(())
    }

    /// Re-arms events and ORs/ANDs status bits: the single mutation
    /// primitive every state-changing call funnels through.
    pub fn enable_socket_event(
        &self,
        handle: SocketHandle,
        rearm: u32,
        set_status: u32,
        clear_status: u32,
    ) {
        if let Ok(record) = self.resolve(handle) {
            {
                let mut state = record.state.lock();
                state.armed |= rearm;
                state.status = (state.status | set_status) & !clear_status;
            }
            reactor::wake();
        }
    }

    /// Windows sockets block by default; the flag tracks the emulated mode,
    /// never the descriptor (host descriptors are always non-blocking).
    pub fn is_blocking(&self, record: &Arc<SockRecord>) -> bool {
        record.state.lock().status & ST_NONBLOCKING == 0
    }

    /// The registered notification interest mask, used by the ioctl adapter
    /// to refuse un-blocking an async-selected socket.
    pub fn notification_mask(&self, record: &Arc<SockRecord>) -> u32 {
        record.state.lock().event_mask
    }

    /// Per-event error snapshot for one bit.
    pub fn event_error(&self, record: &Arc<SockRecord>, bit: usize) -> i32 {
        record.state.lock().errors[bit]
    }

    // -- Accept-queue linkage -----------------------------------------------

    /// Queues an accepted socket for registration inheritance and signals
    /// the listener's service event. On a full ring the linkage is dropped
    /// with a configuration error; the accepted socket itself is unaffected.
    pub fn queue_accept(&self, listener: &Arc<SockRecord>, accepted: SocketHandle) {
        if self
            .accept_queue
            .claim(listener.handle(), accepted)
            .is_none()
        {
            error!(
                "accept queue too small: dropping async notification linkage for socket {accepted:#x}"
            );
            return;
        }
        {
            let mut state = listener.state.lock();
            state.pending |= FD_SERVICE;
            state.status |= ST_ACCEPT_PENDING;
            if let Some(event) = &state.event {
                event.set();
            }
        }
        reactor::ensure_started();
        reactor::wake();
    }

    /// Records carrying any notification registration; the service loop
    /// polls exactly these.
    pub(crate) fn watched(&self) -> Vec<Arc<SockRecord>> {
        self.sockets
            .read()
            .values()
            .filter(|r| {
                let state = r.state.lock();
                state.event.is_some() || state.async_reg.is_some()
            })
            .cloned()
            .collect()
    }
}

// Listening sockets arm accept readiness; connected ones arm the I/O set.
pub(crate) const LISTEN_ARM: u32 = FD_ACCEPT;
pub(crate) const CONNECTED_ARM: u32 = FD_READ | FD_WRITE | FD_CLOSE;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_resolve_close_cycle() {
        let reg = registry();
        let handle = reg
            .create_socket(libc::AF_INET, libc::SOCK_DGRAM, 0)
            .unwrap();
        assert_ne!(handle, 0);

        let record = reg.resolve(handle).unwrap();
        assert_eq!(record.handle(), handle);
        assert!(reg.is_blocking(&record));

        reg.close_socket(handle).unwrap();
        assert_eq!(reg.resolve(handle).unwrap_err(), SockError::NotSocket);
        assert_eq!(reg.close_socket(handle).unwrap_err(), SockError::NotSocket);
    }

    #[test]
    fn handles_are_not_descriptors() {
        let reg = registry();
        let a = reg
            .create_socket(libc::AF_INET, libc::SOCK_DGRAM, 0)
            .unwrap();
        let b = reg
            .create_socket(libc::AF_INET, libc::SOCK_DGRAM, 0)
            .unwrap();
        assert!(a >= 0x0004_0000);
        assert_ne!(a, b);
        reg.close_socket(a).unwrap();
        reg.close_socket(b).unwrap();
    }

    #[test]
    fn enable_socket_event_sets_and_clears_status() {
        let reg = registry();
        let handle = reg
            .create_socket(libc::AF_INET, libc::SOCK_DGRAM, 0)
            .unwrap();
        let record = reg.resolve(handle).unwrap();

        reg.enable_socket_event(handle, FD_READ, ST_NONBLOCKING, 0);
        assert!(!reg.is_blocking(&record));
        {
            let state = record.state.lock();
            assert!(state.armed & FD_READ != 0);
        }
        reg.enable_socket_event(handle, 0, 0, ST_NONBLOCKING);
        assert!(reg.is_blocking(&record));
        reg.close_socket(handle).unwrap();
    }

    #[test]
    fn accept_queue_claims_are_exclusive_under_contention() {
        let queue = AcceptQueue::new();

        // Claim concurrently; every claim must land in a distinct slot.
        let queue = &queue;
        let mut slots = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..ACCEPT_QUEUE_LEN as u32)
                .map(|i| scope.spawn(move || queue.claim(100 + i, 200 + i).unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), ACCEPT_QUEUE_LEN, "two claims shared a slot");

        // Ring is now full: the next claim reports exhaustion.
        assert!(queue.claim(999, 998).is_none());
    }

    #[test]
    fn accept_queue_drain_takes_only_matching_listener() {
        let queue = AcceptQueue::new();
        queue.claim(41, 410).unwrap();
        queue.claim(42, 420).unwrap();

        let mut drained = Vec::new();
        queue.drain(42, |accepted| drained.push(accepted));
        assert_eq!(drained, vec![420]);

        // The other entry is untouched and its slot still claimed.
        let mut rest = Vec::new();
        queue.drain(41, |accepted| rest.push(accepted));
        assert_eq!(rest, vec![410]);

        // Both slots free again.
        assert!(queue.claim(1, 2).is_some());
        assert!(queue.claim(3, 4).is_some());
    }
}
