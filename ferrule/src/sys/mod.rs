//! Raw socket syscalls.
//!
//! Thin wrappers over `libc` that translate return codes into
//! `io::Result`. Every descriptor created here is non-blocking and
//! close-on-exec; none of these functions ever waits.

mod addr;

pub(crate) use addr::SockAddr;

use crate::net::Address;

use libc::{
    F_GETFL, F_SETFL, IPPROTO_IPV6, IPPROTO_TCP, IPV6_V6ONLY, MSG_NOSIGNAL, O_NONBLOCK,
    SO_ERROR, SO_REUSEADDR, SOCK_CLOEXEC, SOCK_NONBLOCK, SOL_SOCKET, TCP_NODELAY, c_int,
    c_void, sockaddr, socklen_t,
};
use std::net::Shutdown;
use std::os::fd::RawFd;
use std::{io, mem};

/// Socket flavours created by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketKind {
    Stream,
    Datagram,
}

impl SocketKind {
    fn as_raw(self) -> c_int {
        match self {
            SocketKind::Stream => libc::SOCK_STREAM,
            SocketKind::Datagram => libc::SOCK_DGRAM,
        }
    }
}

/// Converts a `-1` return code into the current OS error.
fn cvt(rc: c_int) -> io::Result<c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

/// Same as [`cvt`] for syscalls returning a byte count.
fn cvt_size(rc: isize) -> io::Result<usize> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Creates a non-blocking, close-on-exec socket.
pub(crate) fn sys_socket(domain: c_int, kind: SocketKind) -> io::Result<RawFd> {
    cvt(unsafe { libc::socket(domain, kind.as_raw() | SOCK_NONBLOCK | SOCK_CLOEXEC, 0) })
}

/// Creates a connected pair of non-blocking Unix-domain sockets.
pub(crate) fn sys_socketpair(kind: SocketKind) -> io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as c_int; 2];

    cvt(unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            kind.as_raw() | SOCK_NONBLOCK | SOCK_CLOEXEC,
            0,
            fds.as_mut_ptr(),
        )
    })?;

    Ok((fds[0], fds[1]))
}

/// Puts a descriptor into non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = cvt(unsafe { libc::fcntl(fd, F_GETFL) })?;

    if flags & O_NONBLOCK == 0 {
        cvt(unsafe { libc::fcntl(fd, F_SETFL, flags | O_NONBLOCK) })?;
    }

    Ok(())
}

/// Closes a descriptor. Errors are ignored: the descriptor is gone either way.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

/// Binds a socket to a resolved address.
pub(crate) fn sys_bind(fd: RawFd, addr: &SockAddr) -> io::Result<()> {
    cvt(unsafe { libc::bind(fd, addr.as_ptr(), addr.len()) }).map(drop)
}

/// Marks a socket as listening.
pub(crate) fn sys_listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    cvt(unsafe { libc::listen(fd, backlog) }).map(drop)
}

/// Accepts a pending connection.
///
/// The returned descriptor is already non-blocking.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, Address)> {
    let mut storage = SockAddr::empty();
    let mut len = storage.capacity();

    let client = cvt(unsafe {
        libc::accept4(
            fd,
            storage.as_mut_ptr(),
            &mut len,
            SOCK_NONBLOCK | SOCK_CLOEXEC,
        )
    })?;

    storage.set_len(len);

    match storage.to_address() {
        Ok(address) => Ok((client, address)),
        Err(e) => {
            sys_close(client);
            Err(e)
        }
    }
}

/// Starts a connection. On a non-blocking socket this usually fails with
/// `EINPROGRESS`, which callers treat as "wait for writability".
pub(crate) fn sys_connect(fd: RawFd, addr: &SockAddr) -> io::Result<()> {
    cvt(unsafe { libc::connect(fd, addr.as_ptr(), addr.len()) }).map(drop)
}

/// Reads and clears the pending socket error (`SO_ERROR`).
pub(crate) fn sys_take_socket_error(fd: RawFd) -> io::Result<i32> {
    let mut error: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    cvt(unsafe {
        libc::getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            &mut error as *mut _ as *mut c_void,
            &mut len,
        )
    })?;

    Ok(error)
}

/// Receives into `buffer`. `peek` leaves the data queued.
pub(crate) fn sys_recv(fd: RawFd, buffer: &mut [u8], peek: bool) -> io::Result<usize> {
    let flags = if peek { libc::MSG_PEEK } else { 0 };

    cvt_size(unsafe { libc::recv(fd, buffer.as_mut_ptr() as *mut c_void, buffer.len(), flags) })
}

/// Receives one datagram together with its sender.
pub(crate) fn sys_recvfrom(fd: RawFd, buffer: &mut [u8]) -> io::Result<(usize, Address)> {
    let mut storage = SockAddr::empty();
    let mut len = storage.capacity();

    let n = cvt_size(unsafe {
        libc::recvfrom(
            fd,
            buffer.as_mut_ptr() as *mut c_void,
            buffer.len(),
            0,
            storage.as_mut_ptr(),
            &mut len,
        )
    })?;

    storage.set_len(len);

    Ok((n, storage.to_address()?))
}

/// Sends from `buffer`. Never raises `SIGPIPE`.
pub(crate) fn sys_send(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    cvt_size(unsafe {
        libc::send(
            fd,
            buffer.as_ptr() as *const c_void,
            buffer.len(),
            MSG_NOSIGNAL,
        )
    })
}

/// Sends one datagram to `addr`.
pub(crate) fn sys_sendto(fd: RawFd, buffer: &[u8], addr: &SockAddr) -> io::Result<usize> {
    cvt_size(unsafe {
        libc::sendto(
            fd,
            buffer.as_ptr() as *const c_void,
            buffer.len(),
            MSG_NOSIGNAL,
            addr.as_ptr(),
            addr.len(),
        )
    })
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<Address> {
    name_of(fd, libc::getsockname)
}

/// Returns the remote address of a connected socket.
pub(crate) fn sys_peername(fd: RawFd) -> io::Result<Address> {
    name_of(fd, libc::getpeername)
}

fn name_of(
    fd: RawFd,
    call: unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t) -> c_int,
) -> io::Result<Address> {
    let mut storage = SockAddr::empty();
    let mut len = storage.capacity();

    cvt(unsafe { call(fd, storage.as_mut_ptr(), &mut len) })?;
    storage.set_len(len);

    storage.to_address()
}

/// Returns the address family of a socket (`AF_INET`, `AF_UNIX`, ...).
pub(crate) fn sys_domain(fd: RawFd) -> io::Result<c_int> {
    let mut domain: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    cvt(unsafe {
        libc::getsockopt(
            fd,
            SOL_SOCKET,
            libc::SO_DOMAIN,
            &mut domain as *mut _ as *mut c_void,
            &mut len,
        )
    })?;

    Ok(domain)
}

/// Shuts down the read half, the write half or both.
pub(crate) fn sys_shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => libc::SHUT_RD,
        Shutdown::Write => libc::SHUT_WR,
        Shutdown::Both => libc::SHUT_RDWR,
    };

    cvt(unsafe { libc::shutdown(fd, how) }).map(drop)
}

fn set_int_option(fd: RawFd, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
    cvt(unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    })
    .map(drop)
}

/// Enables or disables `SO_REUSEADDR`.
pub(crate) fn sys_set_reuseaddr(fd: RawFd, enabled: bool) -> io::Result<()> {
    set_int_option(fd, SOL_SOCKET, SO_REUSEADDR, enabled as c_int)
}

/// Sets `IPV6_V6ONLY`.
pub(crate) fn sys_set_v6only(fd: RawFd, v6only: bool) -> io::Result<()> {
    set_int_option(fd, IPPROTO_IPV6, IPV6_V6ONLY, v6only as c_int)
}

/// Sets `TCP_NODELAY`.
pub(crate) fn sys_set_nodelay(fd: RawFd, nodelay: bool) -> io::Result<()> {
    set_int_option(fd, IPPROTO_TCP, TCP_NODELAY, nodelay as c_int)
}
