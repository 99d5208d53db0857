//! TCP operations: `create`/`bind`/`listen`/`accept`/`connect`/`delay`
//! plus the ring-buffered `recv`/`send` drivers invoked by the stream
//! adapter.
//!
//! `accept`/`connect` follow the same shape as mio's raw-syscall
//! `TcpStream::connect`: issue the non-blocking call directly, treat
//! `EINPROGRESS`/`WouldBlock` as "still working" rather than failure, and
//! toggle the descriptor blocking only for the duration of a caller's
//! timeout wait.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::address::{Family, NetworkAddress};
use crate::error::{classify_io_error, log_error, log_warn, ErrorClass};
use crate::id::SocketId;
use crate::lifecycle;
use crate::poller;
use crate::record::{SocketRecord, TcpTransport};
use crate::socket::{apply_pending_flags, ensure_slot, lookup, set_flag};
use crate::state::{ConnState, SlotFlags};
use crate::sys::{self, ConnectOutcome, RawFd, INVALID_FD};

/// Allocates a record, installs the TCP transport hooks, and returns its
/// id (`0` on exhaustion).
pub fn create() -> u64 {
    if !lifecycle::is_initialized() {
        log_error!("sockcore: tcp::create called before lifecycle::init");
        return 0;
    }
    let core = lifecycle::core();
    let Some(id) = core.registry.reserve() else {
        log_error!("sockcore: handle registry exhausted");
        return 0;
    };
    let record = Arc::new(SocketRecord::new(id, Arc::new(TcpTransport)));
    core.registry.set(id, record);
    id.as_u64()
}

/// Binds a socket to a local address, lazily opening the descriptor the
/// same way `connect` does. A second bind on an already-bound socket
/// fails, since the underlying descriptor rejects it.
pub fn bind(id: u64, addr: NetworkAddress) -> bool {
    let Some(guard) = lookup(id) else {
        log_error!("sockcore: bind on unknown socket {id}");
        return false;
    };
    let record: &SocketRecord = &guard;
    let Some(index) = ensure_slot(record) else {
        log_error!("sockcore: slot table exhausted binding socket {id}");
        return false;
    };
    let core = lifecycle::core();
    let slot = core.slots.get(index);
    if slot.snapshot().state != ConnState::NotConnected {
        log_warn!("sockcore: bind on socket {id} in invalid state");
        return false;
    }
    let sock_addr = addr.as_socket_addr();
    if !record.establish_family(Family::of(&sock_addr)) {
        log_error!("sockcore: address family mismatch binding socket {id}");
        return false;
    }
    let fd = match open_descriptor(record, slot_fd(slot), sock_addr, index) {
        Ok(fd) => fd,
        Err(err) => {
            log_warn!("sockcore: opening socket {id} for bind: {err}");
            return false;
        }
    };
    if let Err(err) = sys::bind(fd, sock_addr) {
        log_warn!("sockcore: bind failed for socket {id}: {err}");
        return false;
    }
    let bound = sys::local_addr(fd).map(NetworkAddress::new).unwrap_or(addr);
    record.set_address_local(Some(bound));
    true
}

/// Puts a bound socket into the listening state.
pub fn listen(id: u64) -> bool {
    let Some(guard) = lookup(id) else {
        log_error!("sockcore: listen on unknown socket {id}");
        return false;
    };
    let record: &SocketRecord = &guard;
    let base = record.base();
    if base < 0 {
        log_warn!("sockcore: listen on socket {id} with no descriptor");
        return false;
    }
    let core = lifecycle::core();
    let slot = core.slots.get(base as usize);
    let snapshot = slot.snapshot();
    if snapshot.fd == INVALID_FD
        || snapshot.state != ConnState::NotConnected
        || record.address_local().is_none()
    {
        log_warn!("sockcore: listen preconditions not met for socket {id}");
        return false;
    }
    if let Err(err) = sys::listen(snapshot.fd, sys::somaxconn()) {
        log_warn!("sockcore: listen failed for socket {id}: {err}");
        return false;
    }
    slot.with_inner_mut(|inner| inner.state = ConnState::Listening);
    true
}

/// Accepts one pending connection off a listening socket, waiting up to
/// `timeout_ms` for one to arrive. Returns `0` on timeout or failure.
pub fn accept(id: u64, timeout_ms: u32) -> u64 {
    let Some(guard) = lookup(id) else {
        log_error!("sockcore: accept on unknown socket {id}");
        return 0;
    };
    let record: &SocketRecord = &guard;
    let base = record.base();
    if base < 0 {
        return 0;
    }
    let core = lifecycle::core();
    let slot = core.slots.get(base as usize);
    let snapshot = slot.snapshot();
    if snapshot.state != ConnState::Listening {
        log_warn!("sockcore: accept on socket {id} not listening");
        return 0;
    }
    let fd = snapshot.fd;
    let toggled = snapshot.flags.contains(SlotFlags::BLOCKING) && timeout_ms > 0;
    if toggled {
        let _ = sys::set_blocking(fd, false);
    }
    let accepted = accept_once(fd).or_else(|| match sys::wait_readiness(fd, false, Some(timeout_ms as i32)) {
        Ok(r) if r.readable => accept_once(fd),
        _ => None,
    });
    if toggled {
        let _ = sys::set_blocking(fd, true);
    }

    // Clear only the pending-connect flag on the listener's own slot;
    // leave its other flags (blocking, reuse, etc.) untouched.
    slot.with_inner_mut(|inner| inner.flags.remove(SlotFlags::CONNECTION_PENDING));

    let Some((new_fd, peer)) = accepted else {
        return 0;
    };

    let Some(new_id) = core.registry.reserve() else {
        log_error!("sockcore: handle registry exhausted accepting on socket {id}");
        sys::close_fd(new_fd);
        return 0;
    };
    let Some(new_index) = core.slots.claim(new_id) else {
        log_error!("sockcore: slot table exhausted accepting on socket {id}");
        core.registry.free(new_id);
        sys::close_fd(new_fd);
        return 0;
    };

    let new_record = Arc::new(SocketRecord::new(new_id, Arc::new(TcpTransport)));
    new_record.establish_family(Family::of(&peer));
    new_record.set_base(new_index);
    core.slots.get(new_index).with_inner_mut(|inner| {
        inner.fd = new_fd;
        inner.state = ConnState::Connected;
    });
    new_record.set_address_remote(Some(NetworkAddress::new(peer)));
    if let Ok(local) = sys::local_addr(new_fd) {
        new_record.set_address_local(Some(NetworkAddress::new(local)));
    }
    core.registry.set(new_id, new_record);
    new_id.as_u64()
}

fn accept_once(fd: RawFd) -> Option<(RawFd, SocketAddr)> {
    match sys::accept(fd) {
        Ok(pair) => Some(pair),
        Err(err) if classify_io_error(&err) == ErrorClass::WouldBlock => None,
        Err(err) => {
            log_warn!("sockcore: accept failed: {err}");
            None
        }
    }
}

/// Issues a non-blocking connect. With `timeout_ms == 0` an in-progress
/// connect is accepted as success and left to the state poller to
/// resolve; otherwise this call waits up to `timeout_ms` for the
/// descriptor to become writable and checks `SO_ERROR` to confirm success.
pub fn connect(id: u64, address: NetworkAddress, timeout_ms: u32) -> bool {
    let Some(guard) = lookup(id) else {
        log_error!("sockcore: connect on unknown socket {id}");
        return false;
    };
    let record: &SocketRecord = &guard;
    let Some(index) = ensure_slot(record) else {
        log_error!("sockcore: slot table exhausted connecting socket {id}");
        return false;
    };
    let core = lifecycle::core();
    let slot = core.slots.get(index);
    if slot.snapshot().state != ConnState::NotConnected {
        log_warn!("sockcore: connect on socket {id} in invalid state");
        return false;
    }
    let sock_addr = address.as_socket_addr();
    if !record.establish_family(Family::of(&sock_addr)) {
        log_error!("sockcore: address family mismatch connecting socket {id}");
        return false;
    }
    let fd = match open_descriptor(record, slot_fd(slot), sock_addr, index) {
        Ok(fd) => fd,
        Err(err) => {
            log_warn!("sockcore: opening socket {id} for connect: {err}");
            return false;
        }
    };

    slot.with_inner_mut(|inner| {
        inner.flags.remove(
            SlotFlags::CONNECTION_PENDING | SlotFlags::ERROR_PENDING | SlotFlags::HANGUP_PENDING,
        );
        inner.last_event = Instant::now();
    });

    let toggled = slot.snapshot().flags.contains(SlotFlags::BLOCKING) && timeout_ms > 0;
    if toggled {
        let _ = sys::set_blocking(fd, false);
    }

    let success = match record.transport().connect(fd, sock_addr) {
        Ok(ConnectOutcome::Immediate) => {
            slot.with_inner_mut(|inner| inner.state = ConnState::Connected);
            true
        }
        Ok(ConnectOutcome::InProgress) if timeout_ms == 0 => {
            slot.with_inner_mut(|inner| {
                inner.state = ConnState::Connecting;
                inner.flags.insert(SlotFlags::CONNECTION_PENDING);
            });
            true
        }
        Ok(ConnectOutcome::InProgress) => match sys::wait_readiness(fd, true, Some(timeout_ms as i32)) {
            Ok(r) if r.writable => match sys::take_error(fd) {
                Ok(None) => {
                    slot.with_inner_mut(|inner| inner.state = ConnState::Connected);
                    true
                }
                Ok(Some(err)) => {
                    log_warn!("sockcore: connect failed for socket {id}: {err}");
                    slot.with_inner_mut(|inner| inner.flags.insert(SlotFlags::ERROR_PENDING));
                    false
                }
                Err(err) => {
                    log_warn!("sockcore: SO_ERROR query failed for socket {id}: {err}");
                    false
                }
            },
            Ok(_) => {
                log_warn!("sockcore: connect timed out for socket {id}");
                false
            }
            Err(err) => {
                log_warn!("sockcore: readiness probe failed connecting socket {id}: {err}");
                false
            }
        },
        Err(err) => {
            log_warn!("sockcore: connect failed for socket {id}: {err}");
            false
        }
    };

    if toggled {
        let _ = sys::set_blocking(fd, true);
    }

    if success {
        record.set_address_remote(Some(address));
        if let Ok(local) = sys::local_addr(fd) {
            record.set_address_local(Some(NetworkAddress::new(local)));
        }
    }
    success
}

/// Whether Nagle's algorithm is enabled (i.e. `TCP_NODELAY` is off).
pub fn delay(id: u64) -> bool {
    let Some(guard) = lookup(id) else { return false };
    let base = guard.base();
    if base < 0 {
        return false;
    }
    !lifecycle::core().slots.get(base as usize).snapshot().flags.contains(SlotFlags::TCP_NODELAY)
}

/// Toggles Nagle's algorithm (`delay == true` disables `TCP_NODELAY`).
/// Remembered across descriptor recreations — it lives on the slot,
/// applied again by [`crate::socket::apply_pending_flags`] whenever a
/// descriptor reopens.
pub fn set_delay(id: u64, delay: bool) -> bool {
    set_flag(id, SlotFlags::TCP_NODELAY, !delay, sys::set_nodelay)
}

fn slot_fd(slot: &crate::slots::Slot) -> RawFd {
    slot.snapshot().fd
}

fn open_descriptor(
    record: &SocketRecord,
    existing_fd: RawFd,
    addr: SocketAddr,
    index: usize,
) -> std::io::Result<RawFd> {
    if existing_fd != INVALID_FD {
        return Ok(existing_fd);
    }
    let fd = record.transport().open(addr)?;
    let core = lifecycle::core();
    core.slots.get(index).with_inner_mut(|inner| inner.fd = fd);
    apply_pending_flags(record, index, fd);
    Ok(fd)
}

fn handle_peer_closed(record: &SocketRecord, id: SocketId, index: usize) {
    let core = lifecycle::core();
    core.slots.get(index).with_inner_mut(|inner| inner.state = ConnState::Disconnected);
    poller::mark_hangup_once(index, id);
    poller::reconcile_disconnected(record, index);
}

/// Fills the in-ring from the kernel, at most twice per call: a second
/// attempt only happens when the first read filled exactly to the ring's
/// wrap boundary and more was wanted, picking up the wrapped segment.
pub(crate) fn buffered_read(record: &SocketRecord, id: SocketId, index: usize, want: usize) {
    let mut remaining = want;
    for _ in 0..2 {
        match buffered_read_step(record, id, index, remaining) {
            Some((n, wrapped)) if wrapped && n > 0 && n < remaining => {
                remaining -= n;
            }
            _ => break,
        }
    }
}

fn buffered_read_step(record: &SocketRecord, id: SocketId, index: usize, want: usize) -> Option<(usize, bool)> {
    if want == 0 {
        return None;
    }
    let core = lifecycle::core();
    let fd = core.slots.get(index).snapshot().fd;
    if fd == INVALID_FD {
        return None;
    }
    let contiguous_free = record.read_buf().contiguous_free();
    if contiguous_free == 0 {
        return None;
    }
    let mut try_read = contiguous_free.min(want);
    if let Ok(avail) = sys::fionread(fd) {
        if avail > 0 {
            try_read = try_read.min(avail);
        }
    }
    if try_read == 0 {
        return None;
    }
    let limited_by_wrap = try_read == contiguous_free;

    let mut ring = record.read_buf();
    let buf = ring.write_slice(try_read);
    let outcome = record.transport().recv(fd, buf);
    match outcome {
        Ok(0) => {
            drop(ring);
            handle_peer_closed(record, id, index);
            None
        }
        Ok(n) => {
            ring.advance_write(n);
            drop(ring);
            Some((n, limited_by_wrap && n == try_read))
        }
        Err(err) => {
            drop(ring);
            match classify_io_error(&err) {
                ErrorClass::WouldBlock => {}
                ErrorClass::ConnectionTerminated => handle_peer_closed(record, id, index),
                ErrorClass::Other => {
                    log_warn!("sockcore: recv failed on socket {id}: {err}");
                    let _ = poller::poll(record);
                }
            }
            None
        }
    }
}

/// Drains the out-buffer to the kernel, `memmove`-ing the unsent tail on
/// a partial send.
pub(crate) fn buffered_write(record: &SocketRecord, id: SocketId, index: usize) {
    loop {
        let core = lifecycle::core();
        let slot = core.slots.get(index);
        let fd = slot.snapshot().fd;
        if fd == INVALID_FD {
            return;
        }
        let mut out = record.write_buf();
        if out.is_empty() {
            drop(out);
            slot.with_inner_mut(|inner| inner.flags.remove(SlotFlags::REFLUSH));
            return;
        }
        match record.transport().send(fd, out.as_slice()) {
            Ok(0) => return,
            Ok(n) => {
                out.consume(n);
                let drained = out.is_empty();
                drop(out);
                if drained {
                    slot.with_inner_mut(|inner| inner.flags.remove(SlotFlags::REFLUSH));
                    return;
                }
            }
            Err(err) => {
                drop(out);
                match classify_io_error(&err) {
                    ErrorClass::WouldBlock => {
                        slot.with_inner_mut(|inner| inner.flags.insert(SlotFlags::REFLUSH));
                    }
                    ErrorClass::ConnectionTerminated => handle_peer_closed(record, id, index),
                    ErrorClass::Other => log_warn!("sockcore: send failed on socket {id}: {err}"),
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ensure_core_for_tests;
    use crate::socket;

    #[test]
    fn create_and_destroy_roundtrip() {
        ensure_core_for_tests();
        let id = create();
        assert_ne!(id, 0);
        assert!(socket::is_socket(id));
        assert!(socket::destroy(id));
        assert!(!socket::is_socket(id));
    }

    #[test]
    fn bind_then_listen_ipv4_loopback() {
        ensure_core_for_tests();
        let id = create();
        assert!(bind(id, NetworkAddress::ipv4_any(0)));
        let bound = socket::address_local(id).expect("bound address recorded");
        assert_ne!(bound.port(), 0, "OS should have chosen a concrete port");
        assert!(listen(id));
        assert_eq!(socket::state(id), Some(ConnState::Listening));
        socket::destroy(id);
    }

    #[test]
    fn accept_times_out_with_no_connector() {
        ensure_core_for_tests();
        let id = create();
        assert!(bind(id, NetworkAddress::ipv4_any(0)));
        assert!(listen(id));
        let accepted = accept(id, 50);
        assert_eq!(accepted, 0, "no connector attempted; accept must return 0");
        assert_eq!(socket::state(id), Some(ConnState::Listening));
        socket::destroy(id);
    }

    #[test]
    fn connect_and_accept_roundtrip() {
        ensure_core_for_tests();
        let listener = create();
        assert!(bind(listener, NetworkAddress::ipv4_any(0)));
        assert!(listen(listener));
        let addr = socket::address_local(listener).unwrap();

        let client = create();
        assert!(connect(client, addr, 1000));
        assert_eq!(socket::state(client), Some(ConnState::Connected));

        let accepted = accept(listener, 1000);
        assert_ne!(accepted, 0);
        assert_eq!(socket::state(accepted), Some(ConnState::Connected));

        socket::destroy(client);
        socket::destroy(accepted);
        socket::destroy(listener);
    }
}
