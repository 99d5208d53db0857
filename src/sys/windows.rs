//! Winsock primitives backing the socket core: `ioctlsocket(FIONBIO)` in
//! place of POSIX `fcntl(O_NONBLOCK)`, `WSAEWOULDBLOCK`/`WSAEINPROGRESS`
//! in place of `EAGAIN`/`EINPROGRESS`, and Winsock's own shutdown
//! constants.

use std::io;
use std::mem::size_of;
use std::net::SocketAddr;

use windows_sys::Win32::Networking::WinSock as ws;

use crate::error::ErrorClass;

pub type RawFd = usize; // SOCKET

const INVALID_SOCKET: RawFd = usize::MAX;

#[derive(Clone, Copy, Debug, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

fn last_error() -> io::Error {
    io::Error::from_raw_os_error(unsafe { ws::WSAGetLastError() })
}

pub fn classify_os_error(code: i32) -> ErrorClass {
    match code {
        x if x == ws::WSAEWOULDBLOCK || x == ws::WSAEINPROGRESS => ErrorClass::WouldBlock,
        x if x == ws::WSAECONNRESET
            || x == ws::WSAECONNABORTED
            || x == ws::WSAETIMEDOUT
            || x == ws::WSAESHUTDOWN
            || x == ws::WSAENOTCONN => ErrorClass::ConnectionTerminated,
        _ => ErrorClass::Other,
    }
}

/// Winsock requires a `WSAStartup`/`WSACleanup` pairing around any use of
/// the networking API; this performs the startup half.
pub fn platform_startup() -> io::Result<()> {
    let mut wsa_data: ws::WSADATA = unsafe { std::mem::zeroed() };
    let ret = unsafe { ws::WSAStartup(0x0202, &mut wsa_data) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(ret))
    }
}

pub fn platform_shutdown() {
    unsafe {
        ws::WSACleanup();
    }
}

pub fn new_tcp_socket(addr: SocketAddr) -> io::Result<RawFd> {
    let af = if addr.is_ipv6() { ws::AF_INET6 } else { ws::AF_INET };
    let fd = unsafe { ws::socket(af as i32, ws::SOCK_STREAM as i32, ws::IPPROTO_TCP) };
    if fd == INVALID_SOCKET as ws::SOCKET {
        return Err(last_error());
    }
    let fd = fd as RawFd;
    if let Err(err) = set_blocking(fd, false) {
        unsafe { ws::closesocket(fd as ws::SOCKET) };
        return Err(err);
    }
    Ok(fd)
}

fn socket_addr_raw(addr: &SocketAddr) -> (ws::SOCKADDR_STORAGE, i32) {
    let mut storage: ws::SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = ws::SOCKADDR_IN {
                sin_family: ws::AF_INET as u16,
                sin_port: v4.port().to_be(),
                sin_addr: ws::IN_ADDR {
                    S_un: ws::IN_ADDR_0 { S_addr: u32::from_ne_bytes(v4.ip().octets()) },
                },
                sin_zero: [0; 8],
            };
            unsafe {
                std::ptr::copy_nonoverlapping(
                    &sin as *const _ as *const u8,
                    &mut storage as *mut _ as *mut u8,
                    size_of::<ws::SOCKADDR_IN>(),
                );
            }
            size_of::<ws::SOCKADDR_IN>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = ws::SOCKADDR_IN6 {
                sin6_family: ws::AF_INET6 as u16,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: 0,
                sin6_addr: ws::IN6_ADDR { u: ws::IN6_ADDR_0 { Byte: v6.ip().octets() } },
                Anonymous: ws::SOCKADDR_IN6_0 { sin6_scope_id: v6.scope_id() },
            };
            unsafe {
                std::ptr::copy_nonoverlapping(
                    &sin6 as *const _ as *const u8,
                    &mut storage as *mut _ as *mut u8,
                    size_of::<ws::SOCKADDR_IN6>(),
                );
            }
            size_of::<ws::SOCKADDR_IN6>()
        }
    };
    (storage, len as i32)
}

unsafe fn storage_to_addr(storage: &ws::SOCKADDR_STORAGE) -> io::Result<SocketAddr> {
    match storage.ss_family as i32 {
        x if x == ws::AF_INET as i32 => {
            let sin = &*(storage as *const _ as *const ws::SOCKADDR_IN);
            let ip = std::net::Ipv4Addr::from(u32::from_ne_bytes(sin.sin_addr.S_un.S_addr.to_ne_bytes()));
            Ok(SocketAddr::new(ip.into(), u16::from_be(sin.sin_port)))
        }
        x if x == ws::AF_INET6 as i32 => {
            let sin6 = &*(storage as *const _ as *const ws::SOCKADDR_IN6);
            let ip = std::net::Ipv6Addr::from(sin6.sin6_addr.u.Byte);
            Ok(SocketAddr::new(ip.into(), u16::from_be(sin6.sin6_port)))
        }
        _ => Err(io::Error::new(io::ErrorKind::InvalidInput, "unknown address family")),
    }
}

pub enum ConnectOutcome {
    Immediate,
    InProgress,
}

pub fn connect(fd: RawFd, addr: SocketAddr) -> io::Result<ConnectOutcome> {
    let (storage, len) = socket_addr_raw(&addr);
    let ret = unsafe {
        ws::connect(fd as ws::SOCKET, &storage as *const _ as *const ws::SOCKADDR, len)
    };
    if ret == 0 {
        return Ok(ConnectOutcome::Immediate);
    }
    let err = last_error();
    if err.kind() == io::ErrorKind::WouldBlock {
        Ok(ConnectOutcome::InProgress)
    } else {
        Err(err)
    }
}

pub fn bind(fd: RawFd, addr: SocketAddr) -> io::Result<()> {
    let (storage, len) = socket_addr_raw(&addr);
    let ret = unsafe { ws::bind(fd as ws::SOCKET, &storage as *const _ as *const ws::SOCKADDR, len) };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_error())
    }
}

pub fn listen(fd: RawFd, _backlog: i32) -> io::Result<()> {
    let ret = unsafe { ws::listen(fd as ws::SOCKET, ws::SOMAXCONN as i32) };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_error())
    }
}

pub fn somaxconn() -> i32 {
    ws::SOMAXCONN as i32
}

pub fn accept(fd: RawFd) -> io::Result<(RawFd, SocketAddr)> {
    let mut storage: ws::SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
    let mut len = size_of::<ws::SOCKADDR_STORAGE>() as i32;
    let new_fd = unsafe {
        ws::accept(fd as ws::SOCKET, &mut storage as *mut _ as *mut ws::SOCKADDR, &mut len)
    };
    if new_fd == INVALID_SOCKET as ws::SOCKET {
        return Err(last_error());
    }
    let new_fd = new_fd as RawFd;
    if let Err(err) = set_blocking(new_fd, false) {
        unsafe { ws::closesocket(new_fd as ws::SOCKET) };
        return Err(err);
    }
    let addr = unsafe { storage_to_addr(&storage)? };
    Ok((new_fd, addr))
}

pub fn recv(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let n = unsafe { ws::recv(fd as ws::SOCKET, buf.as_mut_ptr(), buf.len() as i32, 0) };
    if n < 0 {
        Err(last_error())
    } else {
        Ok(n as usize)
    }
}

pub fn send(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let n = unsafe { ws::send(fd as ws::SOCKET, buf.as_ptr(), buf.len() as i32, 0) };
    if n < 0 {
        Err(last_error())
    } else {
        Ok(n as usize)
    }
}

pub fn set_blocking(fd: RawFd, blocking: bool) -> io::Result<()> {
    let mut mode: u32 = if blocking { 0 } else { 1 };
    let ret = unsafe { ws::ioctlsocket(fd as ws::SOCKET, ws::FIONBIO, &mut mode) };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_error())
    }
}

pub fn close_fd(fd: RawFd) {
    unsafe {
        ws::shutdown(fd as ws::SOCKET, ws::SD_BOTH as i32);
        ws::closesocket(fd as ws::SOCKET);
    }
}

pub fn set_nodelay(fd: RawFd, nodelay: bool) -> io::Result<()> {
    setsockopt_bool(fd, ws::IPPROTO_TCP as i32, ws::TCP_NODELAY as i32, nodelay)
}

pub fn set_reuseaddr(fd: RawFd, reuse: bool) -> io::Result<()> {
    setsockopt_bool(fd, ws::SOL_SOCKET as i32, ws::SO_REUSEADDR as i32, reuse)
}

fn setsockopt_bool(fd: RawFd, level: i32, name: i32, value: bool) -> io::Result<()> {
    let v: i32 = value as i32;
    let ret = unsafe {
        ws::setsockopt(
            fd as ws::SOCKET,
            level,
            name,
            &v as *const i32 as *const u8,
            size_of::<i32>() as i32,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(last_error())
    }
}

pub fn take_error(fd: RawFd) -> io::Result<Option<io::Error>> {
    let mut err: i32 = 0;
    let mut len = size_of::<i32>() as i32;
    let ret = unsafe {
        ws::getsockopt(
            fd as ws::SOCKET,
            ws::SOL_SOCKET as i32,
            ws::SO_ERROR as i32,
            &mut err as *mut i32 as *mut u8,
            &mut len,
        )
    };
    if ret != 0 {
        return Err(last_error());
    }
    if err == 0 {
        Ok(None)
    } else {
        Ok(Some(io::Error::from_raw_os_error(err)))
    }
}

/// `FIONREAD` via `ioctlsocket`.
pub fn fionread(fd: RawFd) -> io::Result<usize> {
    let mut n: u32 = 0;
    let ret = unsafe { ws::ioctlsocket(fd as ws::SOCKET, ws::FIONREAD, &mut n) };
    if ret != 0 {
        Err(last_error())
    } else {
        Ok(n as usize)
    }
}

pub fn local_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: ws::SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
    let mut len = size_of::<ws::SOCKADDR_STORAGE>() as i32;
    let ret = unsafe {
        ws::getsockname(fd as ws::SOCKET, &mut storage as *mut _ as *mut ws::SOCKADDR, &mut len)
    };
    if ret != 0 {
        return Err(last_error());
    }
    unsafe { storage_to_addr(&storage) }
}

pub fn peer_addr(fd: RawFd) -> io::Result<SocketAddr> {
    let mut storage: ws::SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
    let mut len = size_of::<ws::SOCKADDR_STORAGE>() as i32;
    let ret = unsafe {
        ws::getpeername(fd as ws::SOCKET, &mut storage as *mut _ as *mut ws::SOCKADDR, &mut len)
    };
    if ret != 0 {
        return Err(last_error());
    }
    unsafe { storage_to_addr(&storage) }
}

/// Level-triggered readiness probe built on Winsock `select`.
pub fn wait_readiness(fd: RawFd, want_write: bool, timeout_ms: Option<i32>) -> io::Result<Readiness> {
    unsafe {
        let mut read_set: ws::FD_SET = std::mem::zeroed();
        let mut write_set: ws::FD_SET = std::mem::zeroed();
        let mut except_set: ws::FD_SET = std::mem::zeroed();
        read_set.fd_count = 1;
        read_set.fd_array[0] = fd as ws::SOCKET;
        except_set.fd_count = 1;
        except_set.fd_array[0] = fd as ws::SOCKET;
        let write_ptr = if want_write {
            write_set.fd_count = 1;
            write_set.fd_array[0] = fd as ws::SOCKET;
            &mut write_set as *mut ws::FD_SET
        } else {
            std::ptr::null_mut()
        };

        let mut timeval;
        let timeout_ptr = match timeout_ms {
            Some(ms) => {
                timeval = ws::TIMEVAL {
                    tv_sec: ms / 1000,
                    tv_usec: (ms % 1000) * 1000,
                };
                &mut timeval as *mut ws::TIMEVAL
            }
            None => std::ptr::null_mut(),
        };

        let ret = ws::select(0, &mut read_set, write_ptr, &mut except_set, timeout_ptr);
        if ret < 0 {
            return Err(last_error());
        }
        Ok(Readiness {
            readable: read_set.fd_count > 0,
            writable: want_write && write_set.fd_count > 0,
            error: except_set.fd_count > 0,
        })
    }
}

/// Opens and closes a throwaway UDP socket to probe family support.
fn probe_family(af: i32) -> bool {
    let fd = unsafe { ws::socket(af, ws::SOCK_DGRAM as i32, ws::IPPROTO_UDP) };
    if fd == INVALID_SOCKET as ws::SOCKET {
        return false;
    }
    unsafe {
        ws::closesocket(fd);
    }
    true
}

/// Probes IPv4 support.
pub fn probe_ipv4() -> bool {
    probe_family(ws::AF_INET as i32)
}

/// Probes IPv6 support.
pub fn probe_ipv6() -> bool {
    probe_family(ws::AF_INET6 as i32)
}

/// Windows has no `SO_REUSEPORT`; `reuse_port` is remembered as a flag
/// but has no kernel-level effect here.
pub fn set_reuseport(_fd: RawFd, _reuse: bool) -> io::Result<()> {
    Ok(())
}
