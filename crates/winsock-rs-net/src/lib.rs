//! # winsock-rs-net
//!
//! Host boundary of the Winsock-on-POSIX translation layer. This crate owns
//! the socket handle registry, the blocking/event engine with its service
//! thread, the fd_set translator, the option/ioctl adapter, the directory
//! lookups, and the procedural API surface applications call.
//!
//! Pure logic (constants, translation tables, marshalling, parsers) lives
//! in `winsock-rs-core`; this crate is the only place host syscalls happen.

pub mod api;
pub mod block;
pub mod error;
pub mod event;
pub mod ifenum;
pub mod lookup;
pub mod option;
pub mod reactor;
pub mod registry;
pub mod select;
pub mod sys;

pub use error::{SockError, SockResult};
pub use registry::SocketHandle;
