//! POSIX primitives backing the socket core, grounded on the raw-libc
//! style of `examples/tokio-rs-mio/src/sys/unix/tcp/stream.rs` (direct
//! `libc::connect`/`libc::socket` calls, `EINPROGRESS` treated as
//! "in progress", not failure).

use std::io;
use std::mem::size_of;
use std::net::SocketAddr;
use std::os::unix::io::RawFd as StdRawFd;

use crate::error::ErrorClass;

pub type RawFd = StdRawFd;

/// Readiness bits returned by [`wait_readiness`].
#[derive(Clone, Copy, Debug, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

fn last_os_error() -> io::Error {
    io::Error::last_os_error()
}

/// Maps a raw OS error code into would-block / connection-terminated / other.
pub fn classify_os_error(code: i32) -> ErrorClass {
    match code {
        libc::EAGAIN | libc::EWOULDBLOCK | libc::EINPROGRESS => ErrorClass::WouldBlock,
        libc::ECONNRESET
        | libc::EPIPE
        | libc::ETIMEDOUT
        | libc::ECONNABORTED
        | libc::ENOTCONN
        | libc::ESHUTDOWN => ErrorClass::ConnectionTerminated,
        _ => ErrorClass::Other,
    }
}

/// Creates a non-blocking TCP stream socket for the given address's family.
pub fn new_tcp_socket(addr: SocketAddr) -> io::Result<RawFd> {
    let domain = if addr.is_ipv6() { libc::AF_INET6 } else { libc::AF_INET };
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let ty = libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let ty = libc::SOCK_STREAM;

    let fd = unsafe { libc::socket(domain, ty, 0) };
    if fd < 0 {
        return Err(last_os_error());
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        if let Err(err) = set_blocking(fd, false) {
            unsafe { libc::close(fd) };
            return Err(err);
        }
    }
    Ok(fd)
}

fn socket_addr_raw(addr: &SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let raw: libc::sockaddr_in = unsafe {
                let mut sin: libc::sockaddr_in = std::mem::zeroed();
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_port = v4.port().to_be();
                sin.sin_addr.s_addr = u32::from_ne_bytes(v4.ip().octets());
                sin
            };
            unsafe {
                std::ptr::copy_nonoverlapping(
                    &raw as *const _ as *const u8,
                    &mut storage as *mut _ as *mut u8,
                    size_of::<libc::sockaddr_in>(),
                );
            }
            size_of::<libc::sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let raw: libc::sockaddr_in6 = unsafe {
                let mut sin6: libc::sockaddr_in6 = std::mem::zeroed();
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_port = v6.port().to_be();
                sin6.sin6_addr.s6_addr = v6.ip().octets();
                sin6.sin6_scope_id = v6.scope_id();
                sin6
            };
            unsafe {
                std::ptr::copy_nonoverlapping(
                    &raw as *const _ as *const u8,
                    &mut storage as *mut _ as *mut u8,
                    size_of::<libc::sockaddr_in6>(),
                );
            }
            size_of::<libc::sockaddr_in6>()
        }
    };
    (storage, len as libc::socklen_t)
}

unsafe fn storage_to_addr(storage: &libc::sockaddr_storage) -> io::Result<SocketAddr> {
    match storage.ss_family as i32 {
        libc::AF_INET => {
            let sin = &*(storage as *const _ as *const libc::sockaddr_in);
            let ip = std::net::Ipv4Addr::from(u32::from_ne_bytes(sin.sin_addr.s_addr.to_ne_bytes()));
            Ok(SocketAddr::new(ip.into(), u16::from_be(sin.sin_port)))
        }
        libc::AF_INET6 => {
            let sin6 = &*(storage as *const _ as *const libc::sockaddr_in6);
            let ip = std::net::Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Ok(SocketAddr::new(ip.into(), u16::from_be(sin6.sin6_port)))
        }
        _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "unknown address family")),
    }
}

/// Outcome of a non-blocking `connect`.
pub enum ConnectOutcome {
    Immediate,
    InProgress,
}

pub fn connect(fd: RawFd, addr: SocketAddr) -> io::Result<ConnectOutcome> {
    let (storage, len) = socket_addr_raw(&addr);
    let ret = unsafe { libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len) };
    if ret == 0 {
        return Ok(ConnectOutcome::Immediate);
    }
    let err = last_os_error();
    match err.raw_os_error() {
        Some(libc::EINPROGRESS) => Ok(ConnectOutcome::InProgress),
        _ => Err(err),
    }
}

pub fn bind(fd: RawFd, addr: SocketAddr) -> io::Result<()> {
    let (storage, len) = socket_addr_raw(&addr);
    let ret = unsafe { libc::bind(fd, &storage as *const _ as *const libc::sockaddr, len) };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_os_error())
    }
}

pub fn listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    let ret = unsafe { libc::listen(fd, backlog) };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_os_error())
    }
}

pub fn somaxconn() -> i32 {
    libc::SOMAXCONN as i32
}

pub fn accept(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let new_fd = unsafe {
        libc::accept(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
    };
    if new_fd < 0 {
        return Err(last_os_error());
    }
    if let Err(err) = set_blocking(new_fd, false) {
        unsafe { libc::close(new_fd) };
        return Err(err);
    }
    let addr = unsafe { storage_to_addr(&storage)? };
    Ok((new_fd, addr))
}

pub fn recv(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let n = unsafe {
        libc::recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
    };
    if n < 0 {
        Err(last_os_error())
    } else {
        Ok(n as usize)
    }
}

pub fn send(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    #[cfg(target_os = "linux")]
    let flags = libc::MSG_NOSIGNAL;
    #[cfg(not(target_os = "linux"))]
    let flags = 0;
    let n = unsafe {
        libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), flags)
    };
    if n < 0 {
        Err(last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Toggles `O_NONBLOCK` via `fcntl`.
pub fn set_blocking(fd: RawFd, blocking: bool) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(last_os_error());
    }
    let new_flags = if blocking { flags & !libc::O_NONBLOCK } else { flags | libc::O_NONBLOCK };
    if new_flags != flags {
        let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) };
        if ret < 0 {
            return Err(last_os_error());
        }
    }
    Ok(())
}

/// Full-duplex shutdown, then close.
pub fn close_fd(fd: RawFd) {
    unsafe {
        libc::shutdown(fd, libc::SHUT_RDWR);
        libc::close(fd);
    }
}

pub fn set_nodelay(fd: RawFd, nodelay: bool) -> io::Result<()> {
    setsockopt_bool(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, nodelay)
}

pub fn set_reuseaddr(fd: RawFd, reuse: bool) -> io::Result<()> {
    setsockopt_bool(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, reuse)
}

#[cfg(not(any(target_os = "windows")))]
pub fn set_reuseport(fd: RawFd, reuse: bool) -> io::Result<()> {
    setsockopt_bool(fd, libc::SOL_SOCKET, libc::SO_REUSEPORT, reuse)
}

fn setsockopt_bool(fd: RawFd, level: i32, name: i32, value: bool) -> io::Result<()> {
    let v: libc::c_int = value as libc::c_int;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &v as *const _ as *const libc::c_void,
            size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_os_error())
    }
}

/// `SO_ERROR`, consumed.
pub fn take_error(fd: RawFd) -> io::Result<Option<io::Error>> {
    let mut err: libc::c_int = 0;
    let mut len = size_of::<libc::c_int>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut err as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if ret != 0 {
        return Err(last_os_error());
    }
    if err == 0 {
        Ok(None)
    } else {
        Ok(Some(io::Error::from_raw_os_error(err)))
    }
}

/// Kernel-reported available-to-read byte count (`FIONREAD`).
pub fn fionread(fd: RawFd) -> io::Result<usize> {
    let mut n: libc::c_int = 0;
    let ret = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut n as *mut libc::c_int) };
    if ret < 0 {
        Err(last_os_error())
    } else {
        Ok(n.max(0) as usize)
    }
}

pub fn local_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let ret = unsafe { libc::getsockname(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len) };
    if ret != 0 {
        return Err(last_os_error());
    }
    unsafe { storage_to_addr(&storage) }
}

pub fn peer_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let ret = unsafe { libc::getpeername(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len) };
    if ret != 0 {
        return Err(last_os_error());
    }
    unsafe { storage_to_addr(&storage) }
}

/// Level-triggered readiness probe built on `poll(2)`. `timeout_ms` of
/// `Some(0)` is a zero-timeout probe (used by the state poller); `None`
/// blocks indefinitely.
pub fn wait_readiness(
    fd: RawFd,
    want_write: bool,
    timeout_ms: Option<i32>,
) -> io::Result<Readiness> {
    let mut events = libc::POLLIN;
    if want_write {
        events |= libc::POLLOUT;
    }
    let mut pfd = libc::pollfd { fd, events, revents: 0 };
    let timeout = timeout_ms.unwrap_or(-1);
    let ret = unsafe { libc::poll(&mut pfd as *mut libc::pollfd, 1, timeout) };
    if ret < 0 {
        return Err(last_os_error());
    }
    let revents = pfd.revents;
    Ok(Readiness {
        readable: revents & libc::POLLIN != 0,
        writable: revents & libc::POLLOUT != 0,
        error: revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0,
    })
}

/// Opens and immediately closes a throwaway datagram socket of the given
/// family, used only to probe OS-level support. Any error from the close
/// is intentionally discarded.
fn probe_family(domain: libc::c_int) -> bool {
    let fd = unsafe { libc::socket(domain, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return false;
    }
    unsafe {
        libc::close(fd);
    }
    true
}

/// Probes IPv4 support.
pub fn probe_ipv4() -> bool {
    probe_family(libc::AF_INET)
}

/// Probes IPv6 support.
pub fn probe_ipv6() -> bool {
    probe_family(libc::AF_INET6)
}

/// No platform networking startup is needed on POSIX; mirrors
/// `sys::windows::platform_startup` so `lifecycle::network_init` has one
/// call site on both platforms.
pub fn platform_startup() -> io::Result<()> {
    Ok(())
}

pub fn platform_shutdown() {}
