//! After the server closes the accepted socket, the client's `read`
//! returns 0 and a HANGUP event is observed on the event bus for the
//! client's id. Kept in its own process (separate `tests/*.rs` binary) so
//! installing the process-global event sink here can't race another test
//! file's use of the shared `lifecycle` statics.

use std::io::Read;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use sockcore::address::NetworkAddress;
use sockcore::{socket, stream::SocketStream, tcp, EventKind};

#[test]
fn peer_close_yields_zero_read_and_hangup_event() {
    sockcore::lifecycle::init(64);

    let seen: Arc<Mutex<Vec<(EventKind, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    sockcore::set_event_sink(move |kind, id| {
        sink_seen.lock().unwrap().push((kind, id.as_u64()));
    });

    let listener = tcp::create();
    assert!(tcp::bind(listener, NetworkAddress::new(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))));
    assert!(tcp::listen(listener));
    let addr = socket::address_local(listener).unwrap();

    let client = tcp::create();
    assert!(tcp::connect(client, addr, 1000));
    let accepted = tcp::accept(listener, 1000);
    assert_ne!(accepted, 0);

    // Server closes its end of the accepted connection.
    assert!(socket::close(accepted));

    let mut client_stream = SocketStream::attach(client).expect("client stream attaches");
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    let mut buf = [0u8; 16];
    let mut read_zero = false;
    while std::time::Instant::now() < deadline {
        client_stream.buffer_read(16);
        match client_stream.read(&mut buf) {
            Ok(0) => {
                read_zero = true;
                break;
            }
            Ok(_) => panic!("peer sent no data; a non-zero read is unexpected"),
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(err) => panic!("unexpected read error: {err}"),
        }
    }
    assert!(read_zero, "client read should observe end-of-stream after peer close");

    let events = seen.lock().unwrap();
    assert!(
        events.iter().any(|&(kind, id)| kind == EventKind::Hangup && id == client),
        "expected a HANGUP event for the client's id, got: {events:?}"
    );

    drop(client_stream);
    socket::destroy(client);
    socket::destroy(accepted);
    socket::destroy(listener);
}
