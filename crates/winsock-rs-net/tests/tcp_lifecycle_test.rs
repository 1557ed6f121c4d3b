//! End-to-end socket lifecycle over the loopback interface: the full
//! create/bind/listen/connect/accept path, blocking-mode semantics, and the
//! select translation, all through the procedural surface.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use winsock_rs_core::error as werr;
use winsock_rs_core::fdset::{SetFormat, WireFdSet};
use winsock_rs_core::sockdef::{WS_AF_INET, WS_FIONBIO, WS_IPPROTO_TCP, WS_SOCK_STREAM};
use winsock_rs_net::api;
use winsock_rs_net::SockError;

fn tcp_socket() -> u32 {
    api::socket(WS_AF_INET, WS_SOCK_STREAM, WS_IPPROTO_TCP).unwrap()
}

/// listener bound to an ephemeral loopback port, plus its address.
fn listening_socket() -> (u32, SocketAddrV4) {
    let listener = tcp_socket();
    api::bind(listener, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
    api::listen(listener, 5).unwrap();
    let addr = api::getsockname(listener).unwrap();
    assert_ne!(addr.port(), 0);
    (listener, addr)
}

#[test]
fn echo_round_trip_through_accept() {
    api::startup(0x0202).unwrap();

    let (listener, addr) = listening_socket();
    let client = tcp_socket();
    // Blocking default: the in-progress connect resolves inside the call.
    api::connect(client, addr).unwrap();

    let (server, peer) = api::accept(listener).unwrap();
    assert!(peer.is_some());
    assert_eq!(
        api::getpeername(server).unwrap(),
        api::getsockname(client).unwrap()
    );

    let payload = b"twelve bytes";
    assert_eq!(api::send(client, payload, 0).unwrap(), payload.len());

    let mut buf = [0u8; 64];
    let n = api::recv(server, &mut buf, 0).unwrap();
    assert_eq!(&buf[..n], payload);

    assert_eq!(api::send(server, &buf[..n], 0).unwrap(), n);
    let n = api::recv(client, &mut buf, 0).unwrap();
    assert_eq!(&buf[..n], payload);

    api::closesocket(server).unwrap();
    api::closesocket(client).unwrap();
    api::closesocket(listener).unwrap();
    api::cleanup().unwrap();
}

#[test]
fn blocking_recv_suspends_until_data_arrives() {
    let (listener, addr) = listening_socket();
    let client = tcp_socket();
    api::connect(client, addr).unwrap();
    let (server, _) = api::accept(listener).unwrap();

    let writer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(80));
        api::send(client, b"late data", 0).unwrap();
        client
    });

    // Must not surface would-block; the call parks until the peer writes.
    let mut buf = [0u8; 32];
    let n = api::recv(server, &mut buf, 0).unwrap();
    assert_eq!(&buf[..n], b"late data");

    let client = writer.join().unwrap();
    api::closesocket(client).unwrap();
    api::closesocket(server).unwrap();
    api::closesocket(listener).unwrap();
}

#[test]
fn nonblocking_recv_surfaces_would_block() {
    let (listener, addr) = listening_socket();
    let client = tcp_socket();
    api::connect(client, addr).unwrap();
    let (server, _) = api::accept(listener).unwrap();

    let mut on = 1;
    api::ioctlsocket(server, WS_FIONBIO, &mut on).unwrap();

    let mut buf = [0u8; 16];
    let err = api::recv(server, &mut buf, 0).unwrap_err();
    assert_eq!(err, SockError::WouldBlock);
    assert_eq!(api::last_error(), werr::WSAEWOULDBLOCK);

    api::closesocket(server).unwrap();
    api::closesocket(client).unwrap();
    api::closesocket(listener).unwrap();
}

#[test]
fn select_reports_pending_connection_on_listener() {
    let (listener, addr) = listening_socket();
    let client = tcp_socket();
    api::connect(client, addr).unwrap();

    let mut read = WireFdSet::with_handles(SetFormat::Wide, &[listener]).unwrap();
    let n = api::select(Some(&mut read), None, None, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(n, 1);
    assert!(read.contains(listener));

    let (server, _) = api::accept(listener).unwrap();
    api::closesocket(server).unwrap();
    api::closesocket(client).unwrap();
    api::closesocket(listener).unwrap();
}

#[test]
fn select_compacts_to_ready_entries() {
    let (listener, addr) = listening_socket();
    let client = tcp_socket();
    api::connect(client, addr).unwrap();
    let (server, _) = api::accept(listener).unwrap();
    api::send(client, b"x", 0).unwrap();

    // The idle listener compacts away; the readable socket stays.
    let mut read = WireFdSet::with_handles(SetFormat::Wide, &[listener, server]).unwrap();
    let n = api::select(Some(&mut read), None, None, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(n, 1);
    assert!(read.contains(server));
    assert!(!read.contains(listener));

    api::closesocket(server).unwrap();
    api::closesocket(client).unwrap();
    api::closesocket(listener).unwrap();
}

#[test]
fn connect_refused_reports_transport_error() {
    // Bind a listener to learn a free port, then close it so nothing is
    // listening there.
    let (listener, addr) = listening_socket();
    api::closesocket(listener).unwrap();

    let client = tcp_socket();
    let err = api::connect(client, addr).unwrap_err();
    assert_eq!(err, SockError::Transport(werr::WSAECONNREFUSED));
    assert_eq!(api::last_error(), werr::WSAECONNREFUSED);
    api::closesocket(client).unwrap();
}

#[test]
fn shutdown_send_keeps_receive_side_usable() {
    let (listener, addr) = listening_socket();
    let client = tcp_socket();
    api::connect(client, addr).unwrap();
    let (server, _) = api::accept(listener).unwrap();

    api::send(server, b"parting gift", 0).unwrap();
    api::shutdown(server, 1).unwrap();

    let mut buf = [0u8; 32];
    let n = api::recv(client, &mut buf, 0).unwrap();
    assert_eq!(&buf[..n], b"parting gift");
    // Peer shut down its send side: the stream now reads end-of-stream.
    let n = api::recv(client, &mut buf, 0).unwrap();
    assert_eq!(n, 0);

    api::closesocket(server).unwrap();
    api::closesocket(client).unwrap();
    api::closesocket(listener).unwrap();
}
