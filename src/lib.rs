//! Cross-platform TCP socket object system: a handle-indirection registry,
//! per-socket ring-buffered I/O, a non-blocking connection state machine,
//! and a `Read`/`Write` stream adapter over non-blocking TCP sockets.
//!
//! Nothing here is process-global until [`lifecycle::init`] is called —
//! call it once at startup (typically followed by [`lifecycle::network_init`]
//! to probe IPv4/IPv6 support), then drive sockets through [`tcp`] and
//! [`socket`], and call [`lifecycle::shutdown`] when done.
//!
//! ```no_run
//! use sockcore::address::NetworkAddress;
//!
//! sockcore::lifecycle::init(1024);
//! sockcore::lifecycle::network_init();
//!
//! let id = sockcore::tcp::create();
//! assert!(sockcore::tcp::bind(id, NetworkAddress::ipv4_any(0)));
//! assert!(sockcore::tcp::listen(id));
//!
//! sockcore::socket::destroy(id);
//! sockcore::lifecycle::shutdown();
//! ```

mod buf;
mod event;
mod poller;
mod record;
mod registry;
mod slots;
mod state;
mod sys;

pub mod address;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod socket;
pub mod stream;
pub mod tcp;

pub use event::{set_event_sink, EventKind};
pub use record::Transport;
pub use state::ConnState;
pub use stream::SocketStream;
