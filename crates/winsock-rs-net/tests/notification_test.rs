//! Asynchronous notification end to end: event-select signaling, the
//! enumerate operation, message-based notification, and registration
//! inheritance across accept.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use winsock_rs_core::events::{FD_ACCEPT, FD_CLOSE, FD_READ, FD_READ_BIT};
use winsock_rs_core::sockdef::{WS_AF_INET, WS_IPPROTO_TCP, WS_SOCK_STREAM};
use winsock_rs_net::api;
use winsock_rs_net::event::ChannelSink;

fn tcp_socket() -> u32 {
    api::socket(WS_AF_INET, WS_SOCK_STREAM, WS_IPPROTO_TCP).unwrap()
}

fn connected_pair() -> (u32, u32, u32) {
    let listener = tcp_socket();
    api::bind(listener, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
    api::listen(listener, 5).unwrap();
    let addr = api::getsockname(listener).unwrap();

    let client = tcp_socket();
    api::connect(client, addr).unwrap();
    let (server, _) = api::accept(listener).unwrap();
    (listener, client, server)
}

#[test]
fn event_select_signals_read_with_clean_error() {
    let (listener, client, server) = connected_pair();

    let event = api::create_event();
    api::event_select(server, Some(event.clone()), FD_READ | FD_CLOSE).unwrap();

    api::send(client, b"wake up", 0).unwrap();

    assert!(
        event.wait(Some(Duration::from_secs(5))),
        "readiness change should signal the event object"
    );
    let (mask, errors) = api::enum_network_events(server).unwrap();
    assert!(mask & FD_READ != 0, "read bit missing from {mask:#x}");
    assert_eq!(errors[FD_READ_BIT], 0);

    // The enumerate operation consumed the pending mask and reset the
    // event object.
    assert!(!event.is_set());
    let (mask, _) = api::enum_network_events(server).unwrap();
    assert_eq!(mask, 0);

    api::closesocket(server).unwrap();
    api::closesocket(client).unwrap();
    api::closesocket(listener).unwrap();
}

#[test]
fn async_select_posts_accept_and_inherits_registration() {
    let listener = tcp_socket();
    api::bind(listener, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).unwrap();
    api::listen(listener, 5).unwrap();
    let addr = api::getsockname(listener).unwrap();

    let (sink, rx) = ChannelSink::new();
    api::async_select(
        listener,
        Some((sink, 0x0401)),
        FD_ACCEPT | FD_READ | FD_CLOSE,
    )
    .unwrap();

    let client = tcp_socket();
    api::connect(client, addr).unwrap();

    // The pending connection posts an accept notification.
    let note = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("accept notification");
    assert_eq!(note.socket, listener);
    assert_eq!(note.msg, 0x0401);
    assert_eq!(note.event(), FD_ACCEPT);
    assert_eq!(note.error(), 0);

    // The accepted socket inherits the registration at the next dispatch
    // cycle; data from the peer then posts a read notification against the
    // accepted handle.
    let (server, _) = api::accept(listener).unwrap();
    api::send(client, b"inherited", 0).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline
            .checked_duration_since(std::time::Instant::now())
            .expect("timed out waiting for inherited read notification");
        let note = rx.recv_timeout(remaining).expect("notification stream");
        if note.socket == server && note.event() == FD_READ {
            assert_eq!(note.error(), 0);
            break;
        }
    }

    api::closesocket(server).unwrap();
    api::closesocket(client).unwrap();
    api::closesocket(listener).unwrap();
}

#[test]
fn cancelled_async_select_stops_notifications() {
    let (listener, client, server) = connected_pair();

    let (sink, rx) = ChannelSink::new();
    api::async_select(server, Some((sink, 0x0777)), FD_READ).unwrap();
    api::async_select(server, None, 0).unwrap();

    api::send(client, b"unseen", 0).unwrap();
    assert!(
        rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "cancelled registration must not deliver"
    );

    api::closesocket(server).unwrap();
    api::closesocket(client).unwrap();
    api::closesocket(listener).unwrap();
}
