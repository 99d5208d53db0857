//! Process-global lifecycle: nothing process-global happens until
//! [`init`]/[`network_init`] is called — no ambient state before a
//! constructor runs.

use std::sync::OnceLock;

use crate::error::log_warn;
use crate::registry::Registry;
use crate::slots::SlotTable;
use crate::sys;

/// IPv4/IPv6 support, probed once by [`network_init`] and cached for the
/// process lifetime.
#[derive(Clone, Copy, Debug, Default)]
pub struct Capabilities {
    pub ipv4: bool,
    pub ipv6: bool,
}

pub(crate) struct Core {
    pub registry: Registry,
    pub slots: SlotTable,
    capabilities: OnceLock<Capabilities>,
}

static CORE: OnceLock<Core> = OnceLock::new();

/// Allocates the handle registry (sized to `max_sockets + min(max_sockets,
/// 256)`) and the slot table (sized to `max_sockets`), and zeroes the
/// shared claim cursor. Only the first call takes effect, matching
/// [`crate::event::set_event_sink`]'s call-once convention. Returns `true`
/// if this call performed the initialization.
pub fn init(max_sockets: usize) -> bool {
    let registry_capacity = max_sockets.saturating_add(max_sockets.min(256));
    CORE.set(Core {
        registry: Registry::new(registry_capacity),
        slots: SlotTable::new(max_sockets),
        capabilities: OnceLock::new(),
    })
    .is_ok()
}

pub(crate) fn core() -> &'static Core {
    CORE.get().expect("sockcore: call lifecycle::init() before using the socket core")
}

pub(crate) fn is_initialized() -> bool {
    CORE.get().is_some()
}

/// Closes every live descriptor and drops every registry entry. Rust
/// statics can't be freed mid-process, so this clears the containers in
/// place rather than dropping the `OnceLock` itself — functionally
/// equivalent for a process-lifetime singleton, and the only realization
/// that doesn't require `unsafe` to un-set a `OnceLock`.
pub fn shutdown() {
    let Some(core) = CORE.get() else { return };
    let mut claimed = Vec::new();
    core.slots.scan(|index, _owner, _fd, _state, _flags| claimed.push(index));
    for index in claimed {
        core.slots.release(index);
    }
    core.registry.clear();
}

/// Platform startup (no-op on Unix, `WSAStartup` on Windows) plus an
/// IPv4/IPv6 capability probe by opening and closing a throwaway datagram
/// socket of each family.
pub fn network_init() -> Capabilities {
    if let Err(err) = sys::platform_startup() {
        log_warn!("sockcore: platform network startup failed: {err}");
    }
    let capabilities = Capabilities { ipv4: sys::probe_ipv4(), ipv6: sys::probe_ipv6() };
    if is_initialized() {
        let _ = core().capabilities.set(capabilities);
    }
    capabilities
}

/// The capabilities recorded by the most recent [`network_init`] call, if
/// any.
pub fn capabilities() -> Option<Capabilities> {
    if !is_initialized() {
        return None;
    }
    core().capabilities.get().copied()
}

/// Test-only helper: idempotently brings up a generously-sized shared core.
/// Unit tests across this crate's modules run in one process and so share
/// the `CORE` static; they call this instead of `init` directly so none of
/// them depends on being the one that won the call-once race.
#[cfg(test)]
pub(crate) fn ensure_core_for_tests() {
    let _ = init(10_000);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_is_initialized() {
        ensure_core_for_tests();
        assert!(is_initialized());
    }
}
