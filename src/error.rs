//! Error classification.
//!
//! Public entry points never raise through a structured exception: every
//! failure is local and is translated to `bool`/`SocketId`/byte-count
//! returns at the API boundary. These types exist purely so internal code
//! has one place to classify a raw OS error and one place to log it.

use std::fmt;
use std::io;

/// The three buckets platform code classifies a raw OS error into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Benign on non-blocking I/O; translates to "no progress this call".
    WouldBlock,
    /// Peer reset, broken pipe, timed out, aborted, disconnected: drives
    /// automatic close + HANGUP.
    ConnectionTerminated,
    /// Anything else.
    Other,
}

/// Abstract error kinds used for diagnostics/logging only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketError {
    /// A handle lookup failed.
    InvalidId,
    /// An operation was attempted in the wrong connection state.
    InvalidState,
    /// An address family didn't match a record's established family.
    FamilyMismatch,
    /// A kernel call failed for a reason not otherwise classified.
    SystemCallFailure,
    /// `accept`/`connect` exceeded their caller-supplied timeout.
    Timeout,
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SocketError::InvalidId => "invalid socket id",
            SocketError::InvalidState => "operation invalid in current state",
            SocketError::FamilyMismatch => "address family mismatch",
            SocketError::SystemCallFailure => "system call failed",
            SocketError::Timeout => "operation timed out",
        };
        f.write_str(s)
    }
}

/// Classifies an `io::Error` returned from a socket syscall.
pub fn classify_io_error(err: &io::Error) -> ErrorClass {
    if err.kind() == io::ErrorKind::WouldBlock {
        return ErrorClass::WouldBlock;
    }
    match err.raw_os_error() {
        Some(code) => crate::sys::classify_os_error(code),
        None => ErrorClass::Other,
    }
}

#[cfg(feature = "log")]
macro_rules! log_warn {
    ($($arg:tt)*) => { log::warn!($($arg)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! log_warn {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "log")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "log")]
macro_rules! log_error {
    ($($arg:tt)*) => { log::error!($($arg)*) };
}
#[cfg(not(feature = "log"))]
macro_rules! log_error {
    ($($arg:tt)*) => {{}};
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_warn;
