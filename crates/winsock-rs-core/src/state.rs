//! Socket lifecycle contract.
//!
//! The abstract per-socket state machine, expressed as a deterministic
//! transition table. The registry applies this before touching the host, so
//! misuse is rejected with the right winsock code without a syscall.

use crate::error::{WSAEALREADY, WSAEINVAL, WSAEISCONN, WSAENOTCONN, WSAENOTSOCK};

/// Abstract lifecycle phase of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPhase {
    /// Freshly created; no local address.
    Unbound,
    /// Bound to a local address.
    Bound,
    /// Non-blocking connect in flight.
    Connecting,
    /// Connection established (directly, by completion, or by accept).
    Connected,
    /// Passive socket accepting connections.
    Listening,
    /// Fully shut down or closed; further I/O fails.
    Closed,
}

/// Contract-level operation set for phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockOp {
    Bind,
    Listen,
    /// Host connect returned "in progress".
    ConnectStart,
    /// Pending connect observed complete.
    ConnectDone,
    Accept,
    ShutdownRecv,
    ShutdownSend,
    ShutdownBoth,
    Close,
}

/// Deterministic transition result for a contract operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseOutcome {
    /// Next abstract phase after applying the operation.
    pub next: SocketPhase,
    /// Winsock error code (0 on success).
    pub wsa: i32,
}

const fn ok(next: SocketPhase) -> PhaseOutcome {
    PhaseOutcome { next, wsa: 0 }
}

const fn fail(stay: SocketPhase, wsa: i32) -> PhaseOutcome {
    PhaseOutcome { next: stay, wsa }
}

/// Transition contract for the socket lifecycle.
///
/// A failed operation never changes phase. `Close` succeeds from any phase.
#[must_use]
pub const fn phase_transition(phase: SocketPhase, op: SockOp) -> PhaseOutcome {
    use SockOp::*;
    use SocketPhase::*;

    if matches!(op, Close) {
        return ok(Closed);
    }

    match phase {
        Unbound => match op {
            Bind => ok(Bound),
            // connect() on an unbound socket implicitly binds.
            ConnectStart => ok(Connecting),
            Listen | Accept | ConnectDone => fail(Unbound, WSAEINVAL),
            ShutdownRecv | ShutdownSend | ShutdownBoth => fail(Unbound, WSAENOTCONN),
            Close => ok(Closed),
        },
        Bound => match op {
            Listen => ok(Listening),
            ConnectStart => ok(Connecting),
            Bind | Accept | ConnectDone => fail(Bound, WSAEINVAL),
            ShutdownRecv | ShutdownSend | ShutdownBoth => fail(Bound, WSAENOTCONN),
            Close => ok(Closed),
        },
        Connecting => match op {
            ConnectDone => ok(Connected),
            ConnectStart => fail(Connecting, WSAEALREADY),
            Listen => fail(Connecting, WSAEISCONN),
            Bind | Accept => fail(Connecting, WSAEINVAL),
            ShutdownRecv | ShutdownSend | ShutdownBoth => fail(Connecting, WSAENOTCONN),
            Close => ok(Closed),
        },
        Connected => match op {
            // Partial shutdown keeps the connection's phase.
            ShutdownRecv | ShutdownSend => ok(Connected),
            ShutdownBoth => ok(Closed),
            ConnectStart | Listen => fail(Connected, WSAEISCONN),
            Bind | Accept | ConnectDone => fail(Connected, WSAEINVAL),
            Close => ok(Closed),
        },
        Listening => match op {
            Accept => ok(Listening),
            // Re-listen adjusts the backlog only.
            Listen => ok(Listening),
            Bind | ConnectStart | ConnectDone => fail(Listening, WSAEINVAL),
            ShutdownRecv | ShutdownSend | ShutdownBoth => fail(Listening, WSAENOTCONN),
            Close => ok(Closed),
        },
        Closed => match op {
            Close => ok(Closed),
            _ => fail(Closed, WSAENOTSOCK),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::SockOp::*;
    use super::SocketPhase::*;
    use super::*;

    struct Case {
        phase: SocketPhase,
        op: SockOp,
        next: SocketPhase,
        wsa: i32,
    }

    fn matrix() -> Vec<Case> {
        vec![
            // Happy path: bind -> listen -> accept.
            Case { phase: Unbound, op: Bind, next: Bound, wsa: 0 },
            Case { phase: Bound, op: Listen, next: Listening, wsa: 0 },
            Case { phase: Listening, op: Accept, next: Listening, wsa: 0 },
            Case { phase: Listening, op: Listen, next: Listening, wsa: 0 },
            // Happy path: connect with completion.
            Case { phase: Unbound, op: ConnectStart, next: Connecting, wsa: 0 },
            Case { phase: Bound, op: ConnectStart, next: Connecting, wsa: 0 },
            Case { phase: Connecting, op: ConnectDone, next: Connected, wsa: 0 },
            // Shutdown semantics.
            Case { phase: Connected, op: ShutdownRecv, next: Connected, wsa: 0 },
            Case { phase: Connected, op: ShutdownSend, next: Connected, wsa: 0 },
            Case { phase: Connected, op: ShutdownBoth, next: Closed, wsa: 0 },
            // Misuse.
            Case { phase: Unbound, op: Listen, next: Unbound, wsa: WSAEINVAL },
            Case { phase: Unbound, op: Accept, next: Unbound, wsa: WSAEINVAL },
            Case { phase: Connecting, op: ConnectStart, next: Connecting, wsa: WSAEALREADY },
            Case { phase: Connecting, op: Listen, next: Connecting, wsa: WSAEISCONN },
            Case { phase: Connected, op: ConnectStart, next: Connected, wsa: WSAEISCONN },
            Case { phase: Connected, op: Listen, next: Connected, wsa: WSAEISCONN },
            Case { phase: Listening, op: ConnectStart, next: Listening, wsa: WSAEINVAL },
            Case { phase: Bound, op: ShutdownBoth, next: Bound, wsa: WSAENOTCONN },
            Case { phase: Listening, op: ShutdownRecv, next: Listening, wsa: WSAENOTCONN },
            Case { phase: Closed, op: Bind, next: Closed, wsa: WSAENOTSOCK },
            Case { phase: Closed, op: ConnectStart, next: Closed, wsa: WSAENOTSOCK },
        ]
    }

    #[test]
    fn transition_matrix() {
        for case in matrix() {
            let out = phase_transition(case.phase, case.op);
            assert_eq!(
                out.next, case.next,
                "{:?} + {:?}: wrong next phase",
                case.phase, case.op
            );
            assert_eq!(
                out.wsa, case.wsa,
                "{:?} + {:?}: wrong error",
                case.phase, case.op
            );
        }
    }

    #[test]
    fn close_always_succeeds() {
        for phase in [Unbound, Bound, Connecting, Connected, Listening, Closed] {
            let out = phase_transition(phase, Close);
            assert_eq!(out.next, Closed);
            assert_eq!(out.wsa, 0);
        }
    }

    #[test]
    fn failures_never_change_phase() {
        for phase in [Unbound, Bound, Connecting, Connected, Listening, Closed] {
            for op in [
                Bind,
                Listen,
                ConnectStart,
                ConnectDone,
                Accept,
                ShutdownRecv,
                ShutdownSend,
                ShutdownBoth,
            ] {
                let out = phase_transition(phase, op);
                if out.wsa != 0 {
                    assert_eq!(out.next, phase, "{phase:?} + {op:?} moved on failure");
                }
            }
        }
    }
}
