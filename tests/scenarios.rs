//! End-to-end exercises of the create/bind/listen/connect/accept lifecycle,
//! plus the round-trip and idempotent-close laws. Each `tests/*.rs` file
//! is its own process, so these don't share the library's process-global
//! `lifecycle` state with any other test binary.

use std::io::{Read, Write};
use std::net::Ipv4Addr;

use sockcore::address::NetworkAddress;
use sockcore::{socket, stream::SocketStream, tcp, ConnState};

fn setup() {
    sockcore::lifecycle::init(256);
}

/// Create, assert live, free, assert gone.
#[test]
fn create_free_roundtrip() {
    setup();
    let id = tcp::create();
    assert!(socket::is_socket(id));
    assert!(socket::destroy(id));
    assert!(!socket::is_socket(id));
}

/// Toggling blocking tracks through true -> false -> true.
#[test]
fn blocking_toggle_tracks() {
    setup();
    let id = tcp::create();
    assert!(socket::set_blocking(id, true));
    assert!(socket::blocking(id));
    assert!(socket::set_blocking(id, false));
    assert!(!socket::blocking(id));
    assert!(socket::set_blocking(id, true));
    assert!(socket::blocking(id));
    socket::destroy(id);
}

/// Bind to the first free port in a range, on both families.
#[test]
fn bind_reports_chosen_address() {
    setup();
    for port in 31890u16..32890 {
        let id = tcp::create();
        if tcp::bind(id, NetworkAddress::ipv4_any(port)) {
            let bound = socket::address_local(id).expect("bind recorded a local address");
            assert_eq!(bound.port(), port);
            assert_eq!(socket::state(id), Some(ConnState::NotConnected));
            socket::destroy(id);
            break;
        }
        socket::destroy(id);
    }

    for port in 31890u16..32890 {
        let id = tcp::create();
        if tcp::bind(id, NetworkAddress::ipv6_any(port)) {
            let bound = socket::address_local(id).expect("bind recorded a local address");
            assert_eq!(bound.port(), port);
            assert!(bound.is_ipv6());
            assert_eq!(socket::state(id), Some(ConnState::NotConnected));
            socket::destroy(id);
            break;
        }
        socket::destroy(id);
    }
}

/// Round-trip law: connect, accept, and exchange "Hello World".
#[test]
fn connect_accept_and_roundtrip_bytes() {
    setup();
    let listener = tcp::create();
    assert!(tcp::bind(listener, NetworkAddress::new(
        std::net::SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0),
    )));
    assert!(tcp::listen(listener));
    let addr = socket::address_local(listener).unwrap();

    let client = tcp::create();
    assert!(tcp::connect(client, addr, 1000));

    let accepted = tcp::accept(listener, 1000);
    assert_ne!(accepted, 0);

    let payload: [u8; 11] = [0x48, 0x65, 0x6c, 0x6c, 0x6f, 0x20, 0x57, 0x6f, 0x72, 0x6c, 0x64];

    let mut client_stream = SocketStream::attach(client).expect("client stream attaches");
    client_stream.write_all(&payload).unwrap();
    client_stream.flush().unwrap();

    let mut server_stream = SocketStream::attach(accepted).expect("server stream attaches");
    std::thread::sleep(std::time::Duration::from_millis(50));
    server_stream.buffer_read(64);

    let mut received = [0u8; 11];
    let mut got = 0;
    while got < received.len() {
        let n = server_stream.read(&mut received[got..]).expect("read succeeds");
        if n == 0 {
            break;
        }
        got += n;
    }
    assert_eq!(&received, &payload);

    drop(client_stream);
    drop(server_stream);
    socket::destroy(client);
    socket::destroy(accepted);
    socket::destroy(listener);
}

/// Accept with a short timeout and no connector returns 0 without
/// allocating a new record, and the listener stays LISTENING.
#[test]
fn accept_timeout_with_no_connector() {
    setup();
    let listener = tcp::create();
    assert!(tcp::bind(listener, NetworkAddress::ipv4_any(0)));
    assert!(tcp::listen(listener));

    let before = socket::is_socket(listener);
    let accepted = tcp::accept(listener, 50);
    assert_eq!(accepted, 0);
    assert!(before);
    assert_eq!(socket::state(listener), Some(ConnState::Listening));

    socket::destroy(listener);
}

/// Idempotent close: closing twice is as good as once.
#[test]
fn idempotent_close() {
    setup();
    let id = tcp::create();
    assert!(tcp::bind(id, NetworkAddress::ipv4_any(0)));
    assert!(socket::close(id));
    assert!(socket::close(id));
    assert!(socket::is_socket(id), "close doesn't destroy the record, only the descriptor");
    socket::destroy(id);
}
