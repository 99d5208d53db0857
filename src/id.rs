//! Opaque socket identifiers.

use std::num::NonZeroU64;

/// An opaque handle identifying a live registry entry.
///
/// Zero is reserved to mean "invalid" at the public API boundary; that
/// contract is expressed in Rust by using `Option<SocketId>` (or a raw
/// `u64` return of `0`, for the handful of functions that must return a
/// bare `0`) rather than allowing `SocketId` itself to hold zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(NonZeroU64);

impl SocketId {
    pub(crate) fn from_index(index: u64) -> Self {
        SocketId(NonZeroU64::new(index).expect("registry index must be non-zero"))
    }

    /// The raw numeric value, for FFI-ish boundaries and logging.
    pub fn as_u64(self) -> u64 {
        self.0.get()
    }

    /// Reconstructs a `SocketId` from a raw `u64`, returning `None` for `0`
    /// (the reserved "invalid" sentinel).
    pub fn from_u64(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(SocketId)
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sock#{}", self.0)
    }
}
