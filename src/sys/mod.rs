//! Platform primitives: `set_blocking`, `close_fd`, and an error-code
//! classifier, plus the raw syscalls TCP operations and the state poller
//! need. Windows/POSIX diverge on error codes, the non-blocking toggle,
//! and shutdown constants; everything else in this crate is written
//! against the primitives this module exports.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::*;

/// The platform's invalid-descriptor sentinel.
#[cfg(unix)]
pub type RawFd = libc::c_int;
#[cfg(windows)]
pub type RawFd = usize; // SOCKET, avoids pulling in windows-sys types crate-wide

#[cfg(unix)]
pub const INVALID_FD: RawFd = -1;
#[cfg(windows)]
pub const INVALID_FD: RawFd = usize::MAX; // INVALID_SOCKET
