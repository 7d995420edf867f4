//! Creating sockets on the current runtime.
//!
//! Every helper here must run inside a runtime: the sockets they return
//! suspend on [`Handle::current`].

use super::address::Address;
use super::datagram::DatagramEndpoint;
use super::listener::StreamListener;
use super::socket::NonBlockingSocket;
use super::stream::ByteStream;
use super::tls::TlsContext;
use crate::error::Result;
use crate::runtime::handle::Handle;
use crate::scheduler::Scheduler;
use crate::sys::{self, SockAddr, SocketKind};

use std::path::Path;

/// Options for listening sockets.
///
/// # Examples
///
/// ```rust,ignore
/// let options = ListenOptions::new().backlog(1024).dual_stack(false);
/// let listener = net::listen_tcp("[::]:8080".parse()?, options).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ListenOptions {
    backlog: i32,
    reuse_address: bool,
    dual_stack: bool,
}

impl ListenOptions {
    /// Backlog 128, `SO_REUSEADDR` on, IPv6 sockets accepting IPv4 too.
    pub fn new() -> Self {
        Self {
            backlog: 128,
            reuse_address: true,
            dual_stack: true,
        }
    }

    /// Sets the maximum number of pending connections.
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Enables or disables `SO_REUSEADDR`.
    pub fn reuse_address(mut self, enabled: bool) -> Self {
        self.reuse_address = enabled;
        self
    }

    /// Lets an IPv6 listener also accept IPv4 connections.
    pub fn dual_stack(mut self, enabled: bool) -> Self {
        self.dual_stack = enabled;
        self
    }
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves `address` off-thread if needed and opens a matching socket.
async fn open(
    handle: &Handle,
    address: Address,
    kind: SocketKind,
) -> Result<(NonBlockingSocket, Address)> {
    let address = match address {
        Address::Host { .. } => handle.run_in_thread(move || address.resolve()).await?,
        other => other,
    };

    let fd = sys::sys_socket(SockAddr::family_of(&address)?, kind)?;

    Ok((NonBlockingSocket::from_raw(fd, handle.clone()), address))
}

/// Connects a TCP stream to `host:port`.
///
/// Host names are resolved with the system resolver on the off-load
/// thread; the first address is used. The hostname is remembered for a
/// later [`ByteStream::start_tls`].
pub async fn connect_tcp(host: &str, port: u16) -> Result<ByteStream> {
    let handle = Handle::current();
    let (socket, address) = open(&handle, Address::host(host, port), SocketKind::Stream).await?;

    socket.connect(address).await?;

    Ok(ByteStream::new(socket).with_tls(None, Some(host.to_owned())))
}

/// Connects to `host:port` and performs a TLS client handshake against
/// `host`, using `context` or the default client context.
pub async fn connect_tcp_tls(
    host: &str,
    port: u16,
    context: Option<TlsContext>,
) -> Result<ByteStream> {
    let stream = connect_tcp(host, port).await?;
    let stream = stream.with_tls(context, Some(host.to_owned()));

    stream.start_tls(None).await?;

    Ok(stream)
}

/// Opens a TCP listener on `address`.
pub async fn listen_tcp(address: impl Into<Address>, options: ListenOptions) -> Result<StreamListener> {
    listen(address.into(), options, None).await
}

/// Opens a TCP listener whose connections are upgraded to TLS with the
/// server side of `context`.
pub async fn listen_tcp_tls(
    address: impl Into<Address>,
    context: TlsContext,
    options: ListenOptions,
) -> Result<StreamListener> {
    listen(address.into(), options, Some(context)).await
}

/// Connects a stream to the Unix-domain socket at `path`.
pub async fn connect_unix(path: impl AsRef<Path>) -> Result<ByteStream> {
    let handle = Handle::current();
    let (socket, address) = open(&handle, Address::unix(path.as_ref()), SocketKind::Stream).await?;

    socket.connect(address).await?;

    Ok(ByteStream::new(socket))
}

/// Listens on a Unix-domain socket at `path`.
///
/// The path is bound on the off-load thread. Only the backlog of
/// `options` applies.
pub async fn listen_unix(path: impl AsRef<Path>, options: ListenOptions) -> Result<StreamListener> {
    listen(Address::unix(path.as_ref()), options, None).await
}

async fn listen(
    address: Address,
    options: ListenOptions,
    tls_context: Option<TlsContext>,
) -> Result<StreamListener> {
    let handle = Handle::current();
    let (socket, address) = open(&handle, address, SocketKind::Stream).await?;
    let fd = socket.fd()?;

    if let Address::Inet(inet) = &address {
        if options.reuse_address {
            sys::sys_set_reuseaddr(fd, true)?;
        }

        if inet.is_ipv6() {
            sys::sys_set_v6only(fd, !options.dual_stack)?;
        }
    }

    socket.bind(address).await?;
    sys::sys_listen(fd, options.backlog)?;

    tracing::debug!(fd, address = %socket.local_addr()?, tls = tls_context.is_some(), "listening");

    Ok(StreamListener::new(socket, tls_context))
}

/// Opens a UDP endpoint bound to `address`.
///
/// Bind to port 0 for an ephemeral port.
pub async fn bind_udp(address: impl Into<Address>) -> Result<DatagramEndpoint> {
    let handle = Handle::current();
    let (socket, address) = open(&handle, address.into(), SocketKind::Datagram).await?;

    socket.bind(address).await?;

    Ok(DatagramEndpoint::new(socket))
}

/// Returns two connected streams backed by a Unix socketpair.
pub fn stream_pair() -> Result<(ByteStream, ByteStream)> {
    let handle = Handle::current();
    let (a, b) = sys::sys_socketpair(SocketKind::Stream)?;

    Ok((
        ByteStream::new(NonBlockingSocket::from_raw(a, handle.clone())),
        ByteStream::new(NonBlockingSocket::from_raw(b, handle)),
    ))
}
