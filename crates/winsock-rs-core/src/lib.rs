//! # winsock-rs-core
//!
//! Pure-logic core of the Winsock-on-POSIX translation layer: Windows
//! sockets constants and validators, error-code translation tables, the
//! directory-record marshaller, wire socket-set codecs, and the text parsers
//! for the host directory databases. No `unsafe` code is permitted at the
//! crate level; everything that touches the host lives in `winsock-rs-net`.

#![deny(unsafe_code)]

pub mod dirrec;
pub mod error;
pub mod events;
pub mod fdset;
pub mod ifcfg;
pub mod inet;
pub mod netdb;
pub mod sockdef;
pub mod startup;
pub mod state;
