//! Notification primitives: event objects and message sinks.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::registry::SocketHandle;
use winsock_rs_core::events::{reply_error, reply_event};

// ---------------------------------------------------------------------------
// Event objects
// ---------------------------------------------------------------------------

/// A manual-reset event object, created unsignaled. Once set it stays set
/// until an explicit reset, waking every waiter in between.
#[derive(Debug, Default)]
pub struct WsEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl WsEvent {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }

    /// Blocks until the event is signaled. Returns `false` on timeout;
    /// `None` waits indefinitely.
    #[must_use]
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut signaled = self.signaled.lock();
        match timeout {
            None => {
                while !*signaled {
                    self.cond.wait(&mut signaled);
                }
                true
            }
            Some(limit) => {
                let deadline = std::time::Instant::now() + limit;
                while !*signaled {
                    if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                        return *signaled;
                    }
                }
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Message delivery
// ---------------------------------------------------------------------------

/// Target for message-based notifications. The original delivered window
/// messages; any queue that can take `(socket, msg, reply)` triples works.
/// The reply word packs the event bit in its low half and the per-event
/// error in its high half.
pub trait MessageSink: Send + Sync {
    fn post(&self, socket: SocketHandle, msg: u32, reply: u32);
}

/// One delivered notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    pub socket: SocketHandle,
    pub msg: u32,
    pub reply: u32,
}

impl Notification {
    #[must_use]
    pub const fn event(&self) -> u32 {
        reply_event(self.reply)
    }

    #[must_use]
    pub const fn error(&self) -> i32 {
        reply_error(self.reply)
    }
}

/// Channel-backed sink; the receiving half observes notifications in
/// delivery order.
pub struct ChannelSink {
    tx: Mutex<mpsc::Sender<Notification>>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self { tx: Mutex::new(tx) }), rx)
    }
}

impl MessageSink for ChannelSink {
    fn post(&self, socket: SocketHandle, msg: u32, reply: u32) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.lock().send(Notification { socket, msg, reply });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
