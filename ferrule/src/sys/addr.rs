use crate::net::Address;

use libc::{
    AF_INET, AF_INET6, AF_UNIX, c_int, sa_family_t, sockaddr, sockaddr_in, sockaddr_in6,
    sockaddr_storage, sockaddr_un, socklen_t,
};
use std::ffi::OsStr;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::{io, mem};

/// An OS socket address: a `sockaddr_storage` and its used length.
pub(crate) struct SockAddr {
    storage: sockaddr_storage,
    len: socklen_t,
}

impl SockAddr {
    /// An empty buffer for calls that fill in an address.
    pub(crate) fn empty() -> Self {
        Self {
            storage: unsafe { mem::zeroed() },
            len: mem::size_of::<sockaddr_storage>() as socklen_t,
        }
    }

    /// Converts a resolved [`Address`].
    ///
    /// Unresolved host names are rejected; resolve them first.
    pub(crate) fn from_address(address: &Address) -> io::Result<Self> {
        match address {
            Address::Inet(addr) => Ok(Self::from_inet(addr)),
            Address::Unix(path) => Self::from_path(path),
            Address::Host { host, port } => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{host}:{port} must be resolved before use"),
            )),
        }
    }

    fn from_inet(addr: &SocketAddr) -> Self {
        let mut out = Self::empty();

        match addr {
            SocketAddr::V4(v4) => {
                let sa = unsafe { &mut *(&mut out.storage as *mut _ as *mut sockaddr_in) };
                sa.sin_family = AF_INET as sa_family_t;
                sa.sin_port = v4.port().to_be();
                sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();
                out.len = mem::size_of::<sockaddr_in>() as socklen_t;
            }

            SocketAddr::V6(v6) => {
                let sa = unsafe { &mut *(&mut out.storage as *mut _ as *mut sockaddr_in6) };
                sa.sin6_family = AF_INET6 as sa_family_t;
                sa.sin6_port = v6.port().to_be();
                sa.sin6_addr.s6_addr = v6.ip().octets();
                sa.sin6_flowinfo = v6.flowinfo();
                sa.sin6_scope_id = v6.scope_id();
                out.len = mem::size_of::<sockaddr_in6>() as socklen_t;
            }
        }

        out
    }

    fn from_path(path: &Path) -> io::Result<Self> {
        let mut out = Self::empty();
        let sa = unsafe { &mut *(&mut out.storage as *mut _ as *mut sockaddr_un) };
        let bytes = path.as_os_str().as_bytes();

        // One byte is kept for the terminating NUL.
        if bytes.len() >= sa.sun_path.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unix socket path is too long",
            ));
        }

        sa.sun_family = AF_UNIX as sa_family_t;
        for (dst, src) in sa.sun_path.iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }

        out.len = (mem::offset_of!(sockaddr_un, sun_path) + bytes.len() + 1) as socklen_t;

        Ok(out)
    }

    /// Address family of a resolved [`Address`].
    pub(crate) fn family_of(address: &Address) -> io::Result<c_int> {
        match address {
            Address::Inet(SocketAddr::V4(_)) => Ok(AF_INET),
            Address::Inet(SocketAddr::V6(_)) => Ok(AF_INET6),
            Address::Unix(_) => Ok(AF_UNIX),
            Address::Host { .. } => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "host names have no address family until resolved",
            )),
        }
    }

    pub(crate) fn as_ptr(&self) -> *const sockaddr {
        &self.storage as *const _ as *const sockaddr
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut sockaddr {
        &mut self.storage as *mut _ as *mut sockaddr
    }

    pub(crate) fn len(&self) -> socklen_t {
        self.len
    }

    pub(crate) fn capacity(&self) -> socklen_t {
        mem::size_of::<sockaddr_storage>() as socklen_t
    }

    pub(crate) fn set_len(&mut self, len: socklen_t) {
        self.len = len.min(self.capacity());
    }

    /// Converts back into an [`Address`].
    pub(crate) fn to_address(&self) -> io::Result<Address> {
        match self.storage.ss_family as c_int {
            AF_INET => {
                let sa = unsafe { &*(&self.storage as *const _ as *const sockaddr_in) };
                let ip = Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr));
                let port = u16::from_be(sa.sin_port);

                Ok(Address::Inet(SocketAddr::V4(SocketAddrV4::new(ip, port))))
            }

            AF_INET6 => {
                let sa = unsafe { &*(&self.storage as *const _ as *const sockaddr_in6) };
                let ip = Ipv6Addr::from(sa.sin6_addr.s6_addr);
                let port = u16::from_be(sa.sin6_port);

                Ok(Address::Inet(SocketAddr::V6(SocketAddrV6::new(
                    ip,
                    port,
                    sa.sin6_flowinfo,
                    sa.sin6_scope_id,
                ))))
            }

            AF_UNIX => {
                let sa = unsafe { &*(&self.storage as *const _ as *const sockaddr_un) };
                let offset = mem::offset_of!(sockaddr_un, sun_path);
                let used = (self.len as usize).saturating_sub(offset);

                let raw: Vec<u8> = sa.sun_path[..used.min(sa.sun_path.len())]
                    .iter()
                    .map(|c| *c as u8)
                    .collect();

                // Pathname sockets are NUL terminated; unnamed ones have no bytes.
                let name = match raw.iter().position(|b| *b == 0) {
                    Some(0) => &raw[..],
                    Some(end) => &raw[..end],
                    None => &raw[..],
                };

                Ok(Address::Unix(PathBuf::from(OsStr::from_bytes(name))))
            }

            // An unconnected datagram peer or an unnamed socketpair end.
            0 => Ok(Address::Unix(PathBuf::new())),

            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported address family",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inet_addresses_convert_both_ways() {
        for text in ["127.0.0.1:8080", "[::1]:443"] {
            let address = Address::Inet(text.parse().unwrap());
            let raw = SockAddr::from_address(&address).unwrap();
            assert_eq!(raw.to_address().unwrap(), address);
        }
    }

    #[test]
    fn unix_paths_convert_both_ways() {
        let address = Address::unix("/tmp/ferrule-test.sock");
        let raw = SockAddr::from_address(&address).unwrap();
        assert_eq!(raw.to_address().unwrap(), address);
    }

    #[test]
    fn overlong_unix_path_is_rejected() {
        let path = "/tmp/".to_string() + &"x".repeat(200);
        let err = SockAddr::from_address(&Address::unix(path)).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn unresolved_hosts_are_rejected() {
        assert!(SockAddr::from_address(&Address::host("localhost", 1)).is_err());
    }
}
