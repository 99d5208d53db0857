//! Ownership-by-construction handle registry: `lookup` returns an RAII
//! guard wrapping an `Arc<SocketRecord>` rather than a bare pointer with
//! manual ref++/ref--. Construction of the guard *is* the ref-increment;
//! its `Drop` *is* the ref-decrement. Destruction of the record
//! (`ref == 0`) is `Arc`'s own strong-count-to-zero drop, which the Rust
//! runtime already guarantees happens on exactly one thread.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::id::SocketId;
use crate::record::SocketRecord;

/// An RAII lookup result: `ref++` at construction, `ref--` at `Drop`.
pub struct SocketGuard(Arc<SocketRecord>);

impl Deref for SocketGuard {
    type Target = SocketRecord;

    fn deref(&self) -> &SocketRecord {
        &self.0
    }
}

impl SocketGuard {
    /// Clones the underlying `Arc`, extending the record's lifetime
    /// independent of this guard — a refcount increment without returning
    /// the record, used to extend lifetime across a call.
    pub fn extend(&self) -> Arc<SocketRecord> {
        Arc::clone(&self.0)
    }
}

/// Object map sized at module init.
pub struct Registry {
    entries: RwLock<HashMap<u64, Arc<SocketRecord>>>,
    free_ids: Mutex<Vec<u64>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Registry {
            entries: RwLock::new(HashMap::with_capacity(capacity)),
            free_ids: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            capacity,
        }
    }

    /// Claims a previously unused identifier; `0` on exhaustion. Recycles
    /// freed ids before minting new ones.
    pub fn reserve(&self) -> Option<SocketId> {
        if let Some(raw) = self.free_ids.lock().unwrap().pop() {
            return SocketId::from_u64(raw);
        }
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        if raw as usize > self.capacity {
            // Exhausted: undo the bump so a later `free()` can still hand
            // this slot back out via the free-list.
            self.next_id.fetch_sub(1, Ordering::Relaxed);
            return None;
        }
        SocketId::from_u64(raw)
    }

    /// Installs `record` under `id`, making it visible to `lookup`.
    pub fn set(&self, id: SocketId, record: Arc<SocketRecord>) {
        self.entries.write().unwrap().insert(id.as_u64(), record);
    }

    /// Returns a ref-counted guard for `id`, or `None` if no live record
    /// is registered under it.
    pub fn lookup(&self, id: SocketId) -> Option<SocketGuard> {
        let entries = self.entries.read().unwrap();
        entries.get(&id.as_u64()).cloned().map(SocketGuard)
    }

    pub fn is_socket(&self, id: SocketId) -> bool {
        self.entries.read().unwrap().contains_key(&id.as_u64())
    }

    /// Decouples `id` from its record immediately; subsequent `lookup`s
    /// return `None`. The record itself survives until the last
    /// outstanding `SocketGuard`/`Arc` drops.
    pub fn free(&self, id: SocketId) {
        let removed = self.entries.write().unwrap().remove(&id.as_u64()).is_some();
        if removed {
            self.free_ids.lock().unwrap().push(id.as_u64());
        }
    }

    /// Drops every entry. Records with outstanding guards elsewhere
    /// survive until those guards drop, same as `free`.
    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
        self.free_ids.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TcpTransport;
    use std::sync::Arc;

    #[test]
    fn reserve_set_lookup_free_roundtrip() {
        let registry = Registry::new(8);
        let id = registry.reserve().expect("capacity available");
        registry.set(id, Arc::new(SocketRecord::new(id, Arc::new(TcpTransport))));
        assert!(registry.is_socket(id));
        {
            let guard = registry.lookup(id).expect("record present");
            assert_eq!(guard.id(), id);
        }
        registry.free(id);
        assert!(!registry.is_socket(id));
    }

    #[test]
    fn reserve_recycles_freed_ids() {
        let registry = Registry::new(1);
        let id = registry.reserve().expect("capacity available");
        assert!(registry.reserve().is_none(), "capacity exhausted");
        registry.free(id);
        assert_eq!(registry.reserve(), Some(id));
    }
}
