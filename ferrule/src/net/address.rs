use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A socket address as seen by the adapter.
///
/// IP endpoints are either already resolved ([`Address::Inet`]) or carry a
/// host name that still needs resolving ([`Address::Host`]). Filesystem
/// sockets are named by path ([`Address::Unix`]); an unnamed Unix peer is
/// reported as an empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// A resolved IP address and port.
    Inet(SocketAddr),

    /// A host name and port, resolved lazily on a worker thread.
    Host { host: String, port: u16 },

    /// A Unix-domain socket path.
    Unix(PathBuf),
}

impl Address {
    /// Builds an IP address from a host string and port.
    ///
    /// Literal IP addresses become [`Address::Inet`] right away; anything
    /// else is kept as an unresolved [`Address::Host`].
    pub fn host(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let literal = host.trim_start_matches('[').trim_end_matches(']');

        match literal.parse::<IpAddr>() {
            Ok(ip) => Address::Inet(SocketAddr::new(ip, port)),
            Err(_) => Address::Host { host, port },
        }
    }

    /// Builds a Unix-domain address.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Address::Unix(path.into())
    }

    /// Returns `true` when binding or connecting to this address can never
    /// block (no name resolution or filesystem work involved).
    pub fn is_resolved(&self) -> bool {
        matches!(self, Address::Inet(_))
    }

    /// Returns the IP socket address, if resolved.
    pub fn as_inet(&self) -> Option<SocketAddr> {
        match self {
            Address::Inet(addr) => Some(*addr),
            _ => None,
        }
    }

    /// Returns the filesystem path of a Unix-domain address.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Address::Unix(path) => Some(path),
            _ => None,
        }
    }

    /// Returns the port of an IP address.
    pub fn port(&self) -> Option<u16> {
        match self {
            Address::Inet(addr) => Some(addr.port()),
            Address::Host { port, .. } => Some(*port),
            Address::Unix(_) => None,
        }
    }

    /// Resolves a host name through the system resolver.
    ///
    /// This blocks; callers run it through the scheduler's thread off-load.
    pub(crate) fn resolve(&self) -> io::Result<Address> {
        match self {
            Address::Host { host, port } => (host.as_str(), *port)
                .to_socket_addrs()?
                .next()
                .map(Address::Inet)
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no addresses found for {host}:{port}"),
                    )
                }),
            other => Ok(other.clone()),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Inet(addr)
    }
}

impl From<(IpAddr, u16)> for Address {
    fn from((ip, port): (IpAddr, u16)) -> Self {
        Address::Inet(SocketAddr::new(ip, port))
    }
}

impl From<(&str, u16)> for Address {
    fn from((host, port): (&str, u16)) -> Self {
        Address::host(host, port)
    }
}

impl From<PathBuf> for Address {
    fn from(path: PathBuf) -> Self {
        Address::Unix(path)
    }
}

impl From<&Path> for Address {
    fn from(path: &Path) -> Self {
        Address::Unix(path.to_path_buf())
    }
}

impl FromStr for Address {
    type Err = io::Error;

    /// Parses `ip:port`, `[v6]:port`, `host:port` or `unix:/path`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(path) = s.strip_prefix("unix:") {
            return Ok(Address::unix(path));
        }

        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Address::Inet(addr));
        }

        let invalid = || io::Error::new(io::ErrorKind::InvalidInput, "invalid socket address");

        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Address::host(host, port))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Inet(addr) => write!(f, "{addr}"),
            Address::Host { host, port } => write!(f, "{host}:{port}"),
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_ips_are_resolved() {
        assert!(Address::host("127.0.0.1", 80).is_resolved());
        assert!(Address::host("::1", 80).is_resolved());
        assert!(Address::host("[::1]", 80).is_resolved());
        assert!(!Address::host("localhost", 80).is_resolved());
    }

    #[test]
    fn parses_every_form() {
        assert_eq!(
            "127.0.0.1:9000".parse::<Address>().unwrap(),
            Address::Inet("127.0.0.1:9000".parse().unwrap())
        );
        assert_eq!(
            "example.org:443".parse::<Address>().unwrap(),
            Address::Host {
                host: "example.org".into(),
                port: 443
            }
        );
        assert_eq!(
            "unix:/tmp/ferrule.sock".parse::<Address>().unwrap(),
            Address::unix("/tmp/ferrule.sock")
        );
        assert!("no-port".parse::<Address>().is_err());
        assert!(":80".parse::<Address>().is_err());
    }

    #[test]
    fn display_round_trips_unix_prefix() {
        let addr = Address::unix("/run/app.sock");
        assert_eq!(addr.to_string(), "unix:/run/app.sock");
        assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
    }
}
