//! Reconciles `Connecting -> Connected -> Disconnected` from a
//! non-blocking readiness probe. The `Connected -> Disconnected`
//! fall-through is intentional: after discovering a hangup, a consumer
//! should still get to drain any buffered data before the record is
//! closed, so the two states are not collapsed into one.

use std::time::Instant;

use crate::error::log_warn;
use crate::event::{self, EventKind};
use crate::id::SocketId;
use crate::lifecycle;
use crate::record::SocketRecord;
use crate::state::{ConnState, SlotFlags};
use crate::sys;

/// Resolves `record`'s current connection state against its slot,
/// applying whatever state transition the readiness probe implies.
pub fn poll(record: &SocketRecord) -> ConnState {
    let base = record.base();
    if base < 0 {
        return ConnState::NotConnected;
    }
    let index = base as usize;
    let core = lifecycle::core();
    let slot = core.slots.get(index);
    let snapshot = slot.snapshot();

    match snapshot.state {
        ConnState::NotConnected | ConnState::Listening => snapshot.state,
        ConnState::Connecting => {
            match sys::wait_readiness(snapshot.fd, true, Some(0)) {
                Ok(r) if r.error => {
                    slot.with_inner_mut(|inner| inner.state = ConnState::Disconnected);
                    mark_hangup_once(index, record.id());
                    reconcile_disconnected(record, index)
                }
                Ok(r) if r.writable => {
                    slot.with_inner_mut(|inner| inner.state = ConnState::Connected);
                    ConnState::Connected
                }
                Ok(_) => ConnState::Connecting,
                Err(err) => {
                    log_warn!("sockcore: readiness probe failed while connecting: {err}");
                    ConnState::Connecting
                }
            }
        }
        ConnState::Connected => match sys::fionread(snapshot.fd) {
            Ok(_) => ConnState::Connected,
            Err(_) => {
                // Socket error: transition to DISCONNECTED and fall through
                // to that arm so buffered data can still drain.
                slot.with_inner_mut(|inner| inner.state = ConnState::Disconnected);
                mark_hangup_once(index, record.id());
                reconcile_disconnected(record, index)
            }
        },
        ConnState::Disconnected => reconcile_disconnected(record, index),
    }
}

/// Shared disconnect policy between [`poll`] and the buffered-read/write
/// teardown paths in `tcp::ops`: close once no buffered input remains,
/// otherwise keep the record alive so a consumer can drain the tail.
pub(crate) fn reconcile_disconnected(record: &SocketRecord, index: usize) -> ConnState {
    if record.read_buf().is_empty() {
        finalize_close(record, index);
    }
    ConnState::Disconnected
}

/// Sets `HANGUP_PENDING` and posts [`EventKind::Hangup`] exactly once per
/// teardown.
pub(crate) fn mark_hangup_once(index: usize, id: SocketId) {
    let core = lifecycle::core();
    let slot = core.slots.get(index);
    let already_pending = slot.with_inner_mut(|inner| {
        let was_set = inner.flags.contains(SlotFlags::HANGUP_PENDING);
        inner.flags.insert(SlotFlags::HANGUP_PENDING);
        was_set
    });
    if !already_pending {
        event::post(EventKind::Hangup, id);
    }
}

/// Full close: releases the slot (non-blocking toggle, full-duplex
/// shutdown, descriptor close), zeroes `base`, and frees the local/remote
/// addresses. The record itself survives until its refcount reaches
/// zero; later operations observe `base == -1` and short-circuit.
pub(crate) fn finalize_close(record: &SocketRecord, index: usize) {
    let core = lifecycle::core();
    record.clear_base();
    core.slots.release(index);
    record.set_address_local(None);
    record.set_address_remote(None);
}

/// Touches `last_event`, re-arming edge-triggered event delivery for the
/// next poll.
pub(crate) fn touch_last_event(index: usize) {
    let core = lifecycle::core();
    core.slots.get(index).with_inner_mut(|inner| inner.last_event = Instant::now());
}
