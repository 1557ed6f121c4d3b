//! Network event bits, socket status flags, and notification packing.

// ---------------------------------------------------------------------------
// Network event bits (application-visible)
// ---------------------------------------------------------------------------

pub const FD_READ: u32 = 0x0001;
pub const FD_WRITE: u32 = 0x0002;
pub const FD_OOB: u32 = 0x0004;
pub const FD_ACCEPT: u32 = 0x0008;
pub const FD_CONNECT: u32 = 0x0010;
pub const FD_CLOSE: u32 = 0x0020;

/// Number of event bits that carry a per-event error slot.
pub const FD_MAX_EVENTS: usize = 6;

pub const FD_READ_BIT: usize = 0;
pub const FD_WRITE_BIT: usize = 1;
pub const FD_OOB_BIT: usize = 2;
pub const FD_ACCEPT_BIT: usize = 3;
pub const FD_CONNECT_BIT: usize = 4;
pub const FD_CLOSE_BIT: usize = 5;

/// Mask of every application-visible event bit.
pub const FD_ALL_EVENTS: u32 = FD_READ | FD_WRITE | FD_OOB | FD_ACCEPT | FD_CONNECT | FD_CLOSE;

/// Internal dispatch event: an accepted socket is queued and waiting for its
/// notification registration to be inherited. Never exposed to applications.
pub const FD_SERVICE: u32 = 0x1000_0000;

// ---------------------------------------------------------------------------
// Socket status flags (registry-side state word)
// ---------------------------------------------------------------------------

/// Socket currently has readable data (last observed readiness).
pub const ST_READABLE: u32 = 0x0001_0000;
/// Socket can currently accept writes (last observed readiness).
pub const ST_WRITABLE: u32 = 0x0002_0000;
/// A connect is in flight.
pub const ST_CONNECT_PENDING: u32 = 0x0004_0000;
/// Connection established.
pub const ST_CONNECTED: u32 = 0x0008_0000;
/// listen() succeeded; accept readiness is tracked.
pub const ST_LISTENING: u32 = 0x0010_0000;
/// Application switched the socket to non-blocking mode.
pub const ST_NONBLOCKING: u32 = 0x0020_0000;
/// An accepted connection is queued and not yet notified.
pub const ST_ACCEPT_PENDING: u32 = 0x0040_0000;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns the error-array index for a single event bit.
#[must_use]
pub const fn event_bit_index(event: u32) -> Option<usize> {
    match event {
        FD_READ => Some(FD_READ_BIT),
        FD_WRITE => Some(FD_WRITE_BIT),
        FD_OOB => Some(FD_OOB_BIT),
        FD_ACCEPT => Some(FD_ACCEPT_BIT),
        FD_CONNECT => Some(FD_CONNECT_BIT),
        FD_CLOSE => Some(FD_CLOSE_BIT),
        _ => None,
    }
}

/// Returns the event bit for an error-array index.
#[must_use]
pub const fn bit_event(index: usize) -> u32 {
    1u32 << index
}

/// Packs one event bit and its error code into a notification reply word:
/// event in the low half, error in the high half.
#[must_use]
pub const fn make_select_reply(event: u32, error: i32) -> u32 {
    (event & 0xFFFF) | ((error as u32) << 16)
}

/// Extracts the event half of a notification reply.
#[must_use]
pub const fn reply_event(reply: u32) -> u32 {
    reply & 0xFFFF
}

/// Extracts the error half of a notification reply.
#[must_use]
pub const fn reply_error(reply: u32) -> i32 {
    (reply >> 16) as i32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
