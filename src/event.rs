//! A minimal event bus for notifying a host application of connection
//! lifecycle changes without it having to poll.
//!
//! A single process-global sink may be installed via [`set_event_sink`];
//! [`post`] is a no-op until one is. Real deployments are expected to wire
//! this to their own event bus during `lifecycle::init`.

use std::sync::OnceLock;

use crate::id::SocketId;

/// Kinds of events the core posts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// The peer closed (or the connection otherwise tore down).
    Hangup,
    /// A non-blocking connect completed.
    Connected,
    /// An error occurred.
    Error,
}

type Sink = dyn Fn(EventKind, SocketId) + Send + Sync;

static SINK: OnceLock<Box<Sink>> = OnceLock::new();

/// Installs the process-global event sink. Only the first call takes
/// effect; later calls are ignored (mirrors `lifecycle::init`'s
/// call-once semantics).
pub fn set_event_sink<F>(sink: F)
where
    F: Fn(EventKind, SocketId) + Send + Sync + 'static,
{
    let _ = SINK.set(Box::new(sink));
}

/// Posts an event to the installed sink, if any.
pub fn post(kind: EventKind, id: SocketId) {
    if let Some(sink) = SINK.get() {
        sink(kind, id);
    }
}
