use super::address::Address;
use super::socket::NonBlockingSocket;
use super::stream::ByteStream;
use super::tls::TlsContext;
use crate::error::{Error, Result};
use crate::runtime::handle::Handle;
use crate::scheduler::Scheduler;

use std::fmt;
use std::io;

/// A listening stream socket.
///
/// Accepted connections come out as [`ByteStream`]s. When the listener
/// has a TLS context, every connection is upgraded (server role) before it
/// is handed out.
pub struct StreamListener<S: Scheduler = Handle> {
    socket: NonBlockingSocket<S>,
    tls_context: Option<TlsContext>,
}

impl<S: Scheduler> StreamListener<S> {
    /// Wraps a socket that is already bound and listening.
    pub fn new(socket: NonBlockingSocket<S>, tls_context: Option<TlsContext>) -> Self {
        Self {
            socket,
            tls_context,
        }
    }

    /// The address the listener is bound to.
    pub fn address(&self) -> Result<Address> {
        self.socket.local_addr()
    }

    pub fn socket(&self) -> &NonBlockingSocket<S> {
        &self.socket
    }

    /// Accepts one connection, upgrading it to TLS if configured.
    ///
    /// If the upgrade fails the accepted connection is closed and the
    /// error returned.
    pub async fn accept(&self) -> Result<ByteStream<S>> {
        let (socket, peer) = self.socket.accept().await?;

        tracing::debug!(%peer, fd = ?socket.raw_fd(), "accepted connection");

        let stream = ByteStream::new(socket);

        if let Some(context) = &self.tls_context {
            if let Err(err) = stream.start_tls(Some(context)).await {
                stream.close().await;
                return Err(err);
            }
        }

        Ok(stream)
    }

    /// Lazily accepts connections until the listener is closed.
    pub fn accept_connections(&self) -> Incoming<'_, S> {
        Incoming {
            listener: self,
            done: false,
        }
    }

    /// Stops listening. Pending accepts fail with [`Error::ClosedResource`].
    pub async fn close(&self) {
        self.socket.close().await
    }
}

impl<S: Scheduler> fmt::Debug for StreamListener<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamListener")
            .field("socket", &self.socket)
            .field("tls", &self.tls_context.is_some())
            .finish()
    }
}

/// Sequence returned by [`StreamListener::accept_connections`].
pub struct Incoming<'a, S: Scheduler> {
    listener: &'a StreamListener<S>,
    done: bool,
}

impl<S: Scheduler> Incoming<'_, S> {
    /// Next accepted stream.
    ///
    /// A failed accept or handshake is yielded as an error and the
    /// sequence goes on. It ends once the listener is closed, or after
    /// yielding [`Error::Cancelled`].
    pub async fn next(&mut self) -> Option<Result<ByteStream<S>>> {
        loop {
            if self.done || self.listener.socket.is_closed() {
                return None;
            }

            match self.listener.accept().await {
                Ok(stream) => return Some(Ok(stream)),
                Err(Error::ClosedResource) => {
                    self.done = true;
                    return None;
                }
                // Another acceptor took the connection first.
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(Error::Cancelled) => {
                    self.done = true;
                    return Some(Err(Error::Cancelled));
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
