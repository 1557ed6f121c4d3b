//! Internal error taxonomy.
//!
//! Fallible paths inside the layer use `SockError`; the procedural surface
//! converts every error into a winsock code in the caller's thread-local
//! last-error cell. Nothing unwinds across the API boundary and no code
//! outside the Windows error namespace is ever surfaced.

use thiserror::Error;

use winsock_rs_core::error as werr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SockError {
    /// The handle does not name a live socket.
    #[error("handle is not a socket")]
    NotSocket,
    /// Host transport failure, already translated to a winsock code.
    #[error("transport failure (winsock code {0})")]
    Transport(i32),
    /// Name/service lookup failure (resolver namespace).
    #[error("resolver failure (winsock code {0})")]
    Resolver(i32),
    /// Unsupported option, family, type, or command; detected before any
    /// host syscall.
    #[error("unsupported request (winsock code {0})")]
    Unsupported(i32),
    /// Scratch or queue space exhausted.
    #[error("insufficient buffer space")]
    NoBuffers,
    /// The layer has not been started.
    #[error("sockets layer not initialised")]
    NotInitialised,
    /// The operation would block on a non-blocking socket.
    #[error("operation would block")]
    WouldBlock,
    /// A host wait was interrupted by a signal; callers may retry.
    #[error("interrupted")]
    Interrupted,
}

pub type SockResult<T> = Result<T, SockError>;

impl SockError {
    /// Classifies a captured host errno.
    #[must_use]
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            werr::EINTR => SockError::Interrupted,
            werr::EAGAIN => SockError::WouldBlock,
            _ => SockError::Transport(werr::errno_to_wsa(errno)),
        }
    }

    /// Classifies a resolver h_errno.
    #[must_use]
    pub fn from_herrno(h_errno: i32) -> Self {
        SockError::Resolver(werr::herrno_to_wsa(h_errno))
    }

    /// The winsock code this error surfaces as.
    #[must_use]
    pub const fn wsa_code(self) -> i32 {
        match self {
            SockError::NotSocket => werr::WSAENOTSOCK,
            SockError::Transport(code)
            | SockError::Resolver(code)
            | SockError::Unsupported(code) => code,
            SockError::NoBuffers => werr::WSAENOBUFS,
            SockError::NotInitialised => werr::WSANOTINITIALISED,
            SockError::WouldBlock => werr::WSAEWOULDBLOCK,
            SockError::Interrupted => werr::WSAEINTR,
        }
    }
}

/// Publishes a failure to the thread-local last-error cell and passes the
/// result through. Every API entry point returns through this.
pub(crate) fn surface<T>(result: SockResult<T>) -> SockResult<T> {
    if let Err(err) = &result {
        werr::set_last_error(err.wsa_code());
    }
    result
}
