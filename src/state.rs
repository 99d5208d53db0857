//! Connection state machine and per-slot flags.

use bitflags::bitflags;

/// `NotConnected -> Connecting -> Connected -> Disconnected`, plus
/// `Listening` for server sockets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    NotConnected,
    Connecting,
    Connected,
    Listening,
    Disconnected,
}

bitflags! {
    /// Per-slot flag bitmask.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SlotFlags: u32 {
        const BLOCKING            = 1 << 0;
        const REUSE_ADDR          = 1 << 1;
        const REUSE_PORT          = 1 << 2;
        const TCP_NODELAY         = 1 << 3;
        const POLLED              = 1 << 4;
        const CONNECTION_PENDING  = 1 << 5;
        const ERROR_PENDING       = 1 << 6;
        const HANGUP_PENDING      = 1 << 7;
        const REFLUSH             = 1 << 8;
    }
}
