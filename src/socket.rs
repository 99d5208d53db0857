//! Generic, transport-independent operations over a registered record:
//! lookup, address queries, state, close, and the flag mutators.
//! TCP-specific operations (`create`/`bind`/`listen`/`accept`/`connect`)
//! live in [`crate::tcp`].

use crate::address::NetworkAddress;
use crate::error::{log_error, log_warn};
use crate::id::SocketId;
use crate::lifecycle;
use crate::poller;
use crate::record::SocketRecord;
use crate::registry::SocketGuard;
use crate::state::{ConnState, SlotFlags};
use crate::sys::{self, INVALID_FD};

/// Resolves a raw id to a live record guard, or `None`. Returns `None`
/// rather than panicking if the core hasn't been
/// [`crate::lifecycle::init`]ed yet.
pub(crate) fn lookup(id: u64) -> Option<SocketGuard> {
    let id = SocketId::from_u64(id)?;
    if !lifecycle::is_initialized() {
        return None;
    }
    lifecycle::core().registry.lookup(id)
}

/// True iff lookup succeeds.
pub fn is_socket(id: u64) -> bool {
    lookup(id).is_some()
}

/// The locally bound address, if any.
pub fn address_local(id: u64) -> Option<NetworkAddress> {
    lookup(id)?.address_local()
}

/// The connected peer's address, if any.
pub fn address_remote(id: u64) -> Option<NetworkAddress> {
    lookup(id)?.address_remote()
}

/// Current connection state, delegating to the state poller.
pub fn state(id: u64) -> Option<ConnState> {
    let guard = lookup(id)?;
    Some(poller::poll(&guard))
}

/// Ensures `record` has a claimed slot, claiming one lazily if needed.
/// Called even before any descriptor exists, so flags set pre-connect/bind
/// are remembered and applied once one is opened.
pub(crate) fn ensure_slot(record: &SocketRecord) -> Option<usize> {
    let base = record.base();
    if base >= 0 {
        return Some(base as usize);
    }
    let core = lifecycle::core();
    let index = core.slots.claim(record.id())?;
    record.set_base(index);
    Some(index)
}

/// Applies any flags already tracked on a slot (set before a descriptor
/// existed) to a newly-opened live descriptor. Run once a descriptor
/// becomes live (`tcp::bind`/`tcp::connect`).
pub(crate) fn apply_pending_flags(record: &SocketRecord, index: usize, fd: sys::RawFd) {
    let core = lifecycle::core();
    let flags = core.slots.get(index).snapshot().flags;
    let blocking = flags.contains(SlotFlags::BLOCKING);
    if let Err(err) = sys::set_blocking(fd, blocking) {
        log_warn!("sockcore: applying blocking={blocking} to socket {}: {err}", record.id());
    }
    if flags.contains(SlotFlags::REUSE_ADDR) {
        if let Err(err) = sys::set_reuseaddr(fd, true) {
            log_warn!("sockcore: applying SO_REUSEADDR to socket {}: {err}", record.id());
        }
    }
    if flags.contains(SlotFlags::REUSE_PORT) {
        if let Err(err) = sys::set_reuseport(fd, true) {
            log_warn!("sockcore: applying SO_REUSEPORT to socket {}: {err}", record.id());
        }
    }
    if flags.contains(SlotFlags::TCP_NODELAY) {
        if let Err(err) = sys::set_nodelay(fd, true) {
            log_warn!("sockcore: applying TCP_NODELAY to socket {}: {err}", record.id());
        }
    }
}

pub(crate) fn set_flag(
    id: u64,
    flag: SlotFlags,
    enabled: bool,
    apply: impl Fn(sys::RawFd, bool) -> std::io::Result<()>,
) -> bool {
    let Some(guard) = lookup(id) else {
        log_error!("sockcore: flag mutator on unknown socket {id}");
        return false;
    };
    let Some(index) = ensure_slot(&guard) else {
        log_error!("sockcore: slot table exhausted for socket {id}");
        return false;
    };
    let core = lifecycle::core();
    let slot = core.slots.get(index);
    let fd = slot.with_inner_mut(|inner| {
        if enabled {
            inner.flags.insert(flag);
        } else {
            inner.flags.remove(flag);
        }
        inner.fd
    });
    if fd == INVALID_FD {
        return true;
    }
    match apply(fd, enabled) {
        Ok(()) => true,
        Err(err) => {
            log_warn!("sockcore: kernel call failed applying flag to socket {id}: {err}");
            false
        }
    }
}

/// Marks a socket blocking or non-blocking. Tracked on the slot even
/// before a descriptor exists.
pub fn set_blocking(id: u64, blocking: bool) -> bool {
    set_flag(id, SlotFlags::BLOCKING, blocking, sys::set_blocking)
}

/// Whether the socket is currently marked blocking (absent a descriptor,
/// this is just the tracked flag).
pub fn blocking(id: u64) -> bool {
    let Some(guard) = lookup(id) else { return false };
    let base = guard.base();
    if base < 0 {
        return false;
    }
    lifecycle::core().slots.get(base as usize).snapshot().flags.contains(SlotFlags::BLOCKING)
}

/// Toggles `SO_REUSEADDR`.
pub fn reuse_address(id: u64, reuse: bool) -> bool {
    set_flag(id, SlotFlags::REUSE_ADDR, reuse, sys::set_reuseaddr)
}

/// Toggles `SO_REUSEPORT`.
pub fn reuse_port(id: u64, reuse: bool) -> bool {
    set_flag(id, SlotFlags::REUSE_PORT, reuse, sys::set_reuseport)
}

/// Closes the descriptor, if any. Idempotent: closing an already-closed
/// (`base == -1`) socket is a no-op success.
pub fn close(id: u64) -> bool {
    let Some(guard) = lookup(id) else {
        log_error!("sockcore: close on unknown socket {id}");
        return false;
    };
    let base = guard.base();
    if base >= 0 {
        poller::finalize_close(&guard, base as usize);
    }
    true
}

/// Decrements the registry's reference to `id`, freeing it once the last
/// reference (this one plus any outstanding `SocketGuard`/`Arc`) drops.
pub fn destroy(id: u64) -> bool {
    let Some(id) = SocketId::from_u64(id) else { return false };
    if !lifecycle::is_initialized() {
        return false;
    }
    lifecycle::core().registry.free(id);
    true
}
