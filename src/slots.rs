//! Descriptor slot table: a fixed-size table sized at `lifecycle::init`.
//! Slots are claimed by advancing a shared atomic cursor modulo capacity
//! and CAS-ing `object` from 0 to the caller's id, retrying on contention
//! or occupation. It's the only lock-free structure in the crate, so an
//! external poller can scan it without ever touching a record's heap
//! allocation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::id::SocketId;
use crate::state::{ConnState, SlotFlags};
use crate::sys::{self, RawFd, INVALID_FD};

/// The mutable, non-`object` fields of a slot. Ownership shifts with
/// whichever record is installed there, so a small mutex serializes
/// access instead of relying on unsafe aliasing tricks.
#[derive(Clone, Copy)]
pub struct SlotInner {
    pub fd: RawFd,
    pub flags: SlotFlags,
    pub state: ConnState,
    pub last_event: Instant,
}

impl Default for SlotInner {
    fn default() -> Self {
        SlotInner {
            fd: INVALID_FD,
            flags: SlotFlags::empty(),
            state: ConnState::NotConnected,
            last_event: Instant::now(),
        }
    }
}

/// A single row of the slot table.
pub struct Slot {
    /// The owning record's raw id, or 0 if free.
    object: AtomicU64,
    inner: Mutex<SlotInner>,
}

impl Slot {
    fn new() -> Self {
        Slot { object: AtomicU64::new(0), inner: Mutex::new(SlotInner::default()) }
    }

    /// The owning record's id, if the slot is currently claimed.
    pub fn owner(&self) -> Option<SocketId> {
        SocketId::from_u64(self.object.load(Ordering::Acquire))
    }

    pub fn with_inner<R>(&self, f: impl FnOnce(&SlotInner) -> R) -> R {
        f(&self.inner.lock().unwrap())
    }

    pub fn with_inner_mut<R>(&self, f: impl FnOnce(&mut SlotInner) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }

    /// A copied-out view of the slot's mutable fields, safe to read
    /// without holding the lock across a caller-supplied callback (used by
    /// [`SlotTable::scan`], which must not re-enter the lock while
    /// iterating).
    pub fn snapshot(&self) -> SlotInner {
        *self.inner.lock().unwrap()
    }

    /// Resets this slot to its free state: `object`, `fd`, `flags`, and
    /// `state` all reset together, from the record's perspective
    /// atomically (the record clears `base` first).
    fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = SlotInner::default();
        self.object.store(0, Ordering::Release);
    }
}

/// Fixed-size slot table with a lock-free claim path.
pub struct SlotTable {
    slots: Vec<Slot>,
    cursor: AtomicUsize,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(Slot::new());
        }
        SlotTable { slots, cursor: AtomicUsize::new(0) }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Claims a free slot for `owner`: advances the shared cursor modulo
    /// capacity and CASes `object` from 0 to `owner`, retrying on
    /// contention or occupation, bounded by one full pass over the table
    /// so this never spins forever without a global lock.
    pub fn claim(&self, owner: SocketId) -> Option<usize> {
        if self.slots.is_empty() {
            return None;
        }
        let owner_raw = owner.as_u64();
        for _ in 0..self.slots.len() {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.slots.len();
            let slot = &self.slots[index];
            if slot
                .object
                .compare_exchange(0, owner_raw, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(index);
            }
        }
        None
    }

    pub fn get(&self, index: usize) -> &Slot {
        &self.slots[index]
    }

    /// Releases slot `index`'s kernel descriptor (if any) and resets it to
    /// free.
    pub fn release(&self, index: usize) {
        let slot = &self.slots[index];
        let fd = slot.with_inner(|inner| inner.fd);
        if fd != INVALID_FD {
            let _ = sys::set_blocking(fd, false);
            sys::close_fd(fd);
        }
        slot.reset();
    }

    /// Scans all claimed slots, invoking `f(index, owner, fd, state, flags)`
    /// for each — the contract external event loops use to poll readiness
    /// without dereferencing a (possibly destroyed) record.
    pub fn scan(&self, mut f: impl FnMut(usize, SocketId, RawFd, ConnState, SlotFlags)) {
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(owner) = slot.owner() {
                // Copy the fields out before calling `f`: `f` is allowed to
                // call back into this table (e.g. `release`), which would
                // deadlock if we still held this slot's lock.
                let inner = slot.snapshot();
                if inner.fd != INVALID_FD {
                    f(index, owner, inner.fd, inner.state, inner.flags);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_then_release_frees_the_row() {
        let table = SlotTable::new(4);
        let id = SocketId::from_index(1);
        let index = table.claim(id).expect("slot available");
        assert_eq!(table.get(index).owner(), Some(id));
        table.release(index);
        assert_eq!(table.get(index).owner(), None);
    }

    #[test]
    fn claim_exhausts_capacity() {
        let table = SlotTable::new(2);
        let a = table.claim(SocketId::from_index(1));
        let b = table.claim(SocketId::from_index(2));
        let c = table.claim(SocketId::from_index(3));
        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none());
    }
}
