//! The per-socket heap object: identity, family, ring buffers, counters,
//! addresses, and the transport's function hooks. Owned by the registry
//! as an `Arc<SocketRecord>`; destroyed when the last `Arc` (and so the
//! last `SocketGuard`) drops, via `Arc`'s own strong-count-to-zero drop.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::address::{Family, NetworkAddress};
use crate::buf::{LinearBuffer, RingBuffer, DEFAULT_BUFFER_SIZE};
use crate::id::SocketId;
use crate::sys::{self, ConnectOutcome, RawFd};

/// The slot index sentinel meaning "no slot currently claimed".
pub const NO_SLOT: i64 = -1;

/// Per-record function hooks, selected per transport: a small polymorphic
/// set of operations over the capability set, with TCP as one variant and
/// room for UDP or pipe transports as future ones.
pub trait Transport: Send + Sync {
    /// Opens a non-blocking descriptor suitable for `addr`'s family.
    fn open(&self, addr: std::net::SocketAddr) -> io::Result<RawFd>;
    /// Issues a non-blocking `connect`.
    fn connect(&self, fd: RawFd, addr: std::net::SocketAddr) -> io::Result<ConnectOutcome>;
    /// A single kernel `recv`.
    fn recv(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize>;
    /// A single kernel `send`.
    fn send(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize>;
    /// Called when a stream adapter attaches to a record using this
    /// transport; TCP has nothing to initialize, but the hook exists so
    /// future transports (e.g. a pipe transport needing an initial
    /// handshake read) have a place to do it.
    fn stream_initialize(&self, _record: &SocketRecord) {}
}

/// The TCP realization of [`Transport`].
#[derive(Default)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn open(&self, addr: std::net::SocketAddr) -> io::Result<RawFd> {
        sys::new_tcp_socket(addr)
    }

    fn connect(&self, fd: RawFd, addr: std::net::SocketAddr) -> io::Result<ConnectOutcome> {
        sys::connect(fd, addr)
    }

    fn recv(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        sys::recv(fd, buf)
    }

    fn send(&self, fd: RawFd, buf: &[u8]) -> io::Result<usize> {
        sys::send(fd, buf)
    }
}

pub struct SocketRecord {
    id: SocketId,
    base: AtomicI64,
    family: Mutex<Option<Family>>,
    address_local: Mutex<Option<NetworkAddress>>,
    address_remote: Mutex<Option<NetworkAddress>>,
    read_buf: Mutex<RingBuffer>,
    write_buf: Mutex<LinearBuffer>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    /// At most one stream adapter references this record at a time.
    stream_attached: AtomicBool,
    transport: Arc<dyn Transport>,
}

impl SocketRecord {
    pub fn new(id: SocketId, transport: Arc<dyn Transport>) -> Self {
        Self::with_buffer_sizes(id, transport, DEFAULT_BUFFER_SIZE, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_sizes(
        id: SocketId,
        transport: Arc<dyn Transport>,
        in_buf_size: usize,
        out_buf_size: usize,
    ) -> Self {
        SocketRecord {
            id,
            base: AtomicI64::new(NO_SLOT),
            family: Mutex::new(None),
            address_local: Mutex::new(None),
            address_remote: Mutex::new(None),
            read_buf: Mutex::new(RingBuffer::new(in_buf_size)),
            write_buf: Mutex::new(LinearBuffer::new(out_buf_size)),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            stream_attached: AtomicBool::new(false),
            transport,
        }
    }

    pub fn id(&self) -> SocketId {
        self.id
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn base(&self) -> i64 {
        self.base.load(Ordering::Acquire)
    }

    pub fn set_base(&self, index: usize) {
        self.base.store(index as i64, Ordering::Release);
    }

    /// Clears `base` to [`NO_SLOT`] — the record always does this before
    /// the slot itself is reset.
    pub fn clear_base(&self) {
        self.base.store(NO_SLOT, Ordering::Release);
    }

    pub fn family(&self) -> Option<Family> {
        *self.family.lock().unwrap()
    }

    /// Establishes the record's family on first descriptor creation.
    /// Returns `false` if a descriptor already exists for a *different*
    /// family.
    pub fn establish_family(&self, family: Family) -> bool {
        let mut slot = self.family.lock().unwrap();
        match *slot {
            None => {
                *slot = Some(family);
                true
            }
            Some(existing) => existing == family,
        }
    }

    pub fn address_local(&self) -> Option<NetworkAddress> {
        *self.address_local.lock().unwrap()
    }

    pub fn set_address_local(&self, addr: Option<NetworkAddress>) {
        *self.address_local.lock().unwrap() = addr;
    }

    pub fn address_remote(&self) -> Option<NetworkAddress> {
        *self.address_remote.lock().unwrap()
    }

    pub fn set_address_remote(&self, addr: Option<NetworkAddress>) {
        *self.address_remote.lock().unwrap() = addr;
    }

    pub fn read_buf(&self) -> MutexGuard<'_, RingBuffer> {
        self.read_buf.lock().unwrap()
    }

    pub fn write_buf(&self) -> MutexGuard<'_, LinearBuffer> {
        self.write_buf.lock().unwrap()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    pub fn add_bytes_read(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn add_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    /// Attaches a stream adapter to this record. Returns `false` if one is
    /// already attached.
    pub fn attach_stream(&self) -> bool {
        self.stream_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Clears the record's back-reference to its stream adapter.
    pub fn detach_stream(&self) {
        self.stream_attached.store(false, Ordering::Release);
    }
}
