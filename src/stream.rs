//! Stream adapter.
//!
//! Wraps a registered record in a `Read`/`Write` façade plus a handful of
//! inherent methods that don't map onto those traits: `eos`,
//! `available_read`, `seek` (only `SeekFrom::Current(n >= 0)` is legal, so
//! this is an inherent method and deliberately not `std::io::Seek`),
//! `tell`, `size`/`truncate` (no-ops — a TCP byte stream has no
//! addressable length), and `last_modified`.
//!
//! At most one stream may be attached to a record at a time, enforced by
//! [`SocketRecord::attach_stream`]; `Drop` detaches and releases the
//! record reference exactly once.

use std::io::{self, Read, Write};
use std::time::SystemTime;

use crate::error::log_warn;
use crate::id::SocketId;
use crate::lifecycle;
use crate::record::SocketRecord;
use crate::registry::SocketGuard;
use crate::state::ConnState;
use crate::sys;
use crate::tcp;

/// A `Read`/`Write` façade over a registered socket's ring/linear buffers.
pub struct SocketStream {
    id: SocketId,
    record: SocketGuard,
    opened_at: SystemTime,
}

impl SocketStream {
    /// Attaches a stream to `id`'s record. Fails if the socket is unknown
    /// or already has a stream attached.
    pub fn attach(id: u64) -> Option<Self> {
        let id = SocketId::from_u64(id)?;
        if !lifecycle::is_initialized() {
            return None;
        }
        let record = lifecycle::core().registry.lookup(id)?;
        if !record.attach_stream() {
            log_warn!("sockcore: stream already attached to socket {id}");
            return None;
        }
        record.transport().stream_initialize(&record);
        Some(SocketStream { id, record, opened_at: SystemTime::now() })
    }

    fn record(&self) -> &SocketRecord {
        &self.record
    }

    fn index(&self) -> Option<usize> {
        let base = self.record().base();
        (base >= 0).then_some(base as usize)
    }

    /// True once there's nothing left to read: the connection isn't
    /// (or is no longer) `CONNECTED` — including after a full close, which
    /// drops the descriptor and leaves the socket `NOT_CONNECTED` — and the
    /// in-buffer has been fully drained. A live `CONNECTED` socket with an
    /// empty buffer is not at end-of-stream; more bytes may still arrive.
    pub fn eos(&self) -> bool {
        let state = crate::socket::state(self.id.as_u64());
        !matches!(state, Some(ConnState::Connected)) && self.record().read_buf().is_empty()
    }

    /// Bytes ready to read: whatever's already sitting in the in-buffer,
    /// plus the kernel's own FIONREAD count for a live descriptor (data
    /// that hasn't been pulled into the ring yet).
    pub fn available_read(&self) -> usize {
        let buffered = self.record().read_buf().buffered();
        let pending = self
            .index()
            .map(|index| lifecycle::core().slots.get(index).snapshot().fd)
            .filter(|&fd| fd != sys::INVALID_FD)
            .and_then(|fd| sys::fionread(fd).ok())
            .unwrap_or(0);
        buffered + pending
    }

    /// Pulls more data from the kernel into the in-buffer without
    /// necessarily consuming it; a later `read` drains from the buffer.
    /// `want` bounds how much to request this call.
    pub fn buffer_read(&self, want: usize) {
        let Some(index) = self.index() else { return };
        tcp::buffered_read(self.record(), self.id, index, want);
        if let Some(index) = self.index() {
            crate::poller::touch_last_event(index);
        }
    }

    /// Flushes the out-buffer to the kernel, `memmove`-ing any unsent tail.
    pub fn flush_buffer(&self) {
        let Some(index) = self.index() else { return };
        tcp::buffered_write(self.record(), self.id, index);
    }

    /// Only a forward relative seek (`offset >= 0`) is meaningful here — a
    /// byte stream has no addressable origin or end to seek relative to.
    /// Implemented as discarding the next `offset` buffered-then-fetched
    /// bytes. Returns `false` for any other request.
    pub fn seek(&mut self, offset: i64) -> bool {
        if offset < 0 {
            return false;
        }
        let mut remaining = offset as usize;
        let mut scratch = [0u8; 4096];
        while remaining > 0 {
            let want = remaining.min(scratch.len());
            match self.read(&mut scratch[..want]) {
                Ok(0) => break,
                Ok(n) => remaining -= n,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        remaining == 0
    }

    /// Bytes consumed from this stream so far.
    pub fn tell(&self) -> u64 {
        self.record().bytes_read()
    }

    /// A TCP byte stream has no addressable length.
    pub fn size(&self) -> Option<u64> {
        None
    }

    /// No-op: see [`Self::size`].
    pub fn truncate(&self, _len: u64) -> bool {
        false
    }

    /// The time this adapter was attached, standing in for a filesystem
    /// stream's last-modified query (a live socket has no mtime).
    pub fn last_modified(&self) -> SystemTime {
        self.opened_at
    }
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(index) = self.index() {
            if self.record().read_buf().is_empty() {
                tcp::buffered_read(self.record(), self.id, index, buf.len());
                crate::poller::touch_last_event(index);
            }
        }
        let n = self.record().read_buf().drain_into(buf);
        if n > 0 {
            self.record().add_bytes_read(n as u64);
            return Ok(n);
        }
        if self.eos() {
            return Ok(0);
        }
        Err(io::Error::new(io::ErrorKind::WouldBlock, "no data buffered"))
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.record().write_buf().push(buf);
        if n > 0 {
            self.record().add_bytes_written(n as u64);
        }
        if let Some(index) = self.index() {
            tcp::buffered_write(self.record(), self.id, index);
        }
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "out-buffer full"));
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer();
        if self.record().write_buf().is_empty() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "out-buffer not fully flushed"))
        }
    }
}

impl Drop for SocketStream {
    /// Detaches from the record exactly once. The registry reference
    /// itself is released by `SocketGuard`'s own `Drop`, which runs
    /// immediately after this one.
    fn drop(&mut self) {
        self.record().detach_stream();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ensure_core_for_tests;
    use crate::{socket, tcp};

    #[test]
    fn stream_attach_enforces_single_attachment() {
        ensure_core_for_tests();
        let id = tcp::create();
        let first = SocketStream::attach(id).expect("first attach succeeds");
        assert!(SocketStream::attach(id).is_none(), "second attach must fail");
        drop(first);
        assert!(SocketStream::attach(id).is_some(), "attach succeeds again after drop");
        socket::destroy(id);
    }

    #[test]
    fn stream_read_write_roundtrip() {
        ensure_core_for_tests();
        let listener = tcp::create();
        assert!(tcp::bind(listener, crate::address::NetworkAddress::ipv4_any(0)));
        assert!(tcp::listen(listener));
        let addr = socket::address_local(listener).unwrap();

        let client = tcp::create();
        assert!(tcp::connect(client, addr, 1000));
        let accepted = tcp::accept(listener, 1000);
        assert_ne!(accepted, 0);

        let mut client_stream = SocketStream::attach(client).expect("client stream");
        let mut server_stream = SocketStream::attach(accepted).expect("server stream");

        client_stream.write_all(b"hello").unwrap();
        client_stream.flush().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(50));
        server_stream.buffer_read(64);
        let mut out = [0u8; 5];
        let n = server_stream.read(&mut out).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");

        drop(client_stream);
        drop(server_stream);
        socket::destroy(client);
        socket::destroy(accepted);
        socket::destroy(listener);
    }
}
