//! Windows sockets error namespace and translation tables.
//!
//! Three concerns live here: the WSA error constants, the total translation
//! functions from the host errno / resolver h_errno namespaces into the WSA
//! namespace, and the thread-local last-error cell every API entry point
//! reports through.

use std::cell::Cell;

// ---------------------------------------------------------------------------
// Windows sockets error constants (WSABASEERR = 10000)
// ---------------------------------------------------------------------------

pub const WSABASEERR: i32 = 10000;

pub const WSAEINTR: i32 = 10004;
pub const WSAEBADF: i32 = 10009;
pub const WSAEACCES: i32 = 10013;
pub const WSAEFAULT: i32 = 10014;
pub const WSAEINVAL: i32 = 10022;
pub const WSAEMFILE: i32 = 10024;
pub const WSAEWOULDBLOCK: i32 = 10035;
pub const WSAEINPROGRESS: i32 = 10036;
pub const WSAEALREADY: i32 = 10037;
pub const WSAENOTSOCK: i32 = 10038;
pub const WSAEDESTADDRREQ: i32 = 10039;
pub const WSAEMSGSIZE: i32 = 10040;
pub const WSAEPROTOTYPE: i32 = 10041;
pub const WSAENOPROTOOPT: i32 = 10042;
pub const WSAEPROTONOSUPPORT: i32 = 10043;
pub const WSAESOCKTNOSUPPORT: i32 = 10044;
pub const WSAEOPNOTSUPP: i32 = 10045;
pub const WSAEPFNOSUPPORT: i32 = 10046;
pub const WSAEAFNOSUPPORT: i32 = 10047;
pub const WSAEADDRINUSE: i32 = 10048;
pub const WSAEADDRNOTAVAIL: i32 = 10049;
pub const WSAENETDOWN: i32 = 10050;
pub const WSAENETUNREACH: i32 = 10051;
pub const WSAENETRESET: i32 = 10052;
pub const WSAECONNABORTED: i32 = 10053;
pub const WSAECONNRESET: i32 = 10054;
pub const WSAENOBUFS: i32 = 10055;
pub const WSAEISCONN: i32 = 10056;
pub const WSAENOTCONN: i32 = 10057;
pub const WSAESHUTDOWN: i32 = 10058;
pub const WSAETOOMANYREFS: i32 = 10059;
pub const WSAETIMEDOUT: i32 = 10060;
pub const WSAECONNREFUSED: i32 = 10061;
pub const WSAELOOP: i32 = 10062;
pub const WSAENAMETOOLONG: i32 = 10063;
pub const WSAEHOSTDOWN: i32 = 10064;
pub const WSAEHOSTUNREACH: i32 = 10065;
pub const WSAENOTEMPTY: i32 = 10066;
pub const WSAEUSERS: i32 = 10068;
pub const WSAEDQUOT: i32 = 10069;
pub const WSAESTALE: i32 = 10070;
pub const WSAEREMOTE: i32 = 10071;
pub const WSASYSNOTREADY: i32 = 10091;
pub const WSAVERNOTSUPPORTED: i32 = 10092;
pub const WSANOTINITIALISED: i32 = 10093;

/// Resolver error namespace (distinct from the transport errors above).
pub const WSAHOST_NOT_FOUND: i32 = 11001;
pub const WSATRY_AGAIN: i32 = 11002;
pub const WSANO_RECOVERY: i32 = 11003;
pub const WSANO_DATA: i32 = 11004;

// ---------------------------------------------------------------------------
// Host errno constants
// ---------------------------------------------------------------------------
// Linux numbering. Kept local so the translation tables stay pure and
// testable without the host crate.

pub const EPERM: i32 = 1;
pub const EINTR: i32 = 4;
pub const EBADF: i32 = 9;
pub const EAGAIN: i32 = 11;
pub const EWOULDBLOCK: i32 = EAGAIN;
pub const EACCES: i32 = 13;
pub const EFAULT: i32 = 14;
pub const EINVAL: i32 = 22;
pub const EMFILE: i32 = 24;
pub const EPIPE: i32 = 32;
pub const ENAMETOOLONG: i32 = 36;
pub const ENOTEMPTY: i32 = 39;
pub const ELOOP: i32 = 40;
pub const EREMOTE: i32 = 66;
pub const EUSERS: i32 = 87;
pub const ENOTSOCK: i32 = 88;
pub const EDESTADDRREQ: i32 = 89;
pub const EMSGSIZE: i32 = 90;
pub const EPROTOTYPE: i32 = 91;
pub const ENOPROTOOPT: i32 = 92;
pub const EPROTONOSUPPORT: i32 = 93;
pub const ESOCKTNOSUPPORT: i32 = 94;
pub const EOPNOTSUPP: i32 = 95;
pub const EPFNOSUPPORT: i32 = 96;
pub const EAFNOSUPPORT: i32 = 97;
pub const EADDRINUSE: i32 = 98;
pub const EADDRNOTAVAIL: i32 = 99;
pub const ENETDOWN: i32 = 100;
pub const ENETUNREACH: i32 = 101;
pub const ENETRESET: i32 = 102;
pub const ECONNABORTED: i32 = 103;
pub const ECONNRESET: i32 = 104;
pub const ENOBUFS: i32 = 105;
pub const EISCONN: i32 = 106;
pub const ENOTCONN: i32 = 107;
pub const ESHUTDOWN: i32 = 108;
pub const ETOOMANYREFS: i32 = 109;
pub const ETIMEDOUT: i32 = 110;
pub const ECONNREFUSED: i32 = 111;
pub const EHOSTDOWN: i32 = 112;
pub const EHOSTUNREACH: i32 = 113;
pub const EALREADY: i32 = 114;
pub const EINPROGRESS: i32 = 115;
pub const ESTALE: i32 = 116;
pub const EDQUOT: i32 = 122;

// ---------------------------------------------------------------------------
// Resolver h_errno constants
// ---------------------------------------------------------------------------

pub const HOST_NOT_FOUND: i32 = 1;
pub const TRY_AGAIN: i32 = 2;
pub const NO_RECOVERY: i32 = 3;
pub const NO_DATA: i32 = 4;

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

/// Maps a host errno value to the corresponding WSA error code.
///
/// Total over `i32`: zero maps to zero ("no error") and every code outside
/// the table degrades to [`WSAEOPNOTSUPP`], never to zero.
#[must_use]
pub const fn errno_to_wsa(errno: i32) -> i32 {
    match errno {
        0 => 0,
        EINTR => WSAEINTR,
        EBADF => WSAEBADF,
        EPERM | EACCES => WSAEACCES,
        EFAULT => WSAEFAULT,
        EINVAL => WSAEINVAL,
        EMFILE => WSAEMFILE,
        EWOULDBLOCK => WSAEWOULDBLOCK,
        EINPROGRESS => WSAEINPROGRESS,
        EALREADY => WSAEALREADY,
        ENOTSOCK => WSAENOTSOCK,
        EDESTADDRREQ => WSAEDESTADDRREQ,
        EMSGSIZE => WSAEMSGSIZE,
        EPROTOTYPE => WSAEPROTOTYPE,
        ENOPROTOOPT => WSAENOPROTOOPT,
        EPROTONOSUPPORT => WSAEPROTONOSUPPORT,
        ESOCKTNOSUPPORT => WSAESOCKTNOSUPPORT,
        EOPNOTSUPP => WSAEOPNOTSUPP,
        EPFNOSUPPORT => WSAEPFNOSUPPORT,
        EAFNOSUPPORT => WSAEAFNOSUPPORT,
        EADDRINUSE => WSAEADDRINUSE,
        EADDRNOTAVAIL => WSAEADDRNOTAVAIL,
        ENETDOWN => WSAENETDOWN,
        ENETUNREACH => WSAENETUNREACH,
        ENETRESET => WSAENETRESET,
        ECONNABORTED => WSAECONNABORTED,
        // EPIPE reports as a reset connection, matching application
        // expectations for writes on a dead peer.
        EPIPE | ECONNRESET => WSAECONNRESET,
        ENOBUFS => WSAENOBUFS,
        EISCONN => WSAEISCONN,
        ENOTCONN => WSAENOTCONN,
        ESHUTDOWN => WSAESHUTDOWN,
        ETOOMANYREFS => WSAETOOMANYREFS,
        ETIMEDOUT => WSAETIMEDOUT,
        ECONNREFUSED => WSAECONNREFUSED,
        ELOOP => WSAELOOP,
        ENAMETOOLONG => WSAENAMETOOLONG,
        EHOSTDOWN => WSAEHOSTDOWN,
        EHOSTUNREACH => WSAEHOSTUNREACH,
        ENOTEMPTY => WSAENOTEMPTY,
        EUSERS => WSAEUSERS,
        EDQUOT => WSAEDQUOT,
        ESTALE => WSAESTALE,
        EREMOTE => WSAEREMOTE,
        _ => WSAEOPNOTSUPP,
    }
}

/// Maps a resolver h_errno value to the corresponding WSA error code.
///
/// Same totality rule as [`errno_to_wsa`]: zero stays zero, unknown codes
/// degrade to [`WSAEOPNOTSUPP`].
#[must_use]
pub const fn herrno_to_wsa(h_errno: i32) -> i32 {
    match h_errno {
        0 => 0,
        HOST_NOT_FOUND => WSAHOST_NOT_FOUND,
        TRY_AGAIN => WSATRY_AGAIN,
        NO_RECOVERY => WSANO_RECOVERY,
        NO_DATA => WSANO_DATA,
        ENOBUFS => WSAENOBUFS,
        _ => WSAEOPNOTSUPP,
    }
}

// ---------------------------------------------------------------------------
// Thread-local last error
// ---------------------------------------------------------------------------

thread_local! {
    static LAST_ERROR: Cell<i32> = const { Cell::new(0) };
}

/// Returns the calling thread's last winsock error code.
pub fn last_error() -> i32 {
    LAST_ERROR.get()
}

/// Sets the calling thread's last winsock error code.
pub fn set_last_error(code: i32) {
    LAST_ERROR.set(code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
