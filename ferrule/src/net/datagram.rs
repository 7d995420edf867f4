use super::address::Address;
use super::socket::NonBlockingSocket;
use crate::error::{Error, Result};
use crate::runtime::handle::Handle;
use crate::scheduler::Scheduler;

use std::fmt;

/// A datagram socket.
///
/// Packets are sent and received whole. With [`connect`](Self::connect)
/// the endpoint gets a default destination and `send` may omit one.
pub struct DatagramEndpoint<S: Scheduler = Handle> {
    socket: NonBlockingSocket<S>,
}

impl<S: Scheduler> DatagramEndpoint<S> {
    pub fn new(socket: NonBlockingSocket<S>) -> Self {
        Self { socket }
    }

    /// The local address the endpoint is bound to.
    pub fn address(&self) -> Result<Address> {
        self.socket.local_addr()
    }

    pub fn socket(&self) -> &NonBlockingSocket<S> {
        &self.socket
    }

    /// Sets the default destination and filters incoming packets to it.
    pub async fn connect(&self, address: impl Into<Address>) -> Result<()> {
        self.socket.connect(address).await
    }

    /// Receives one packet of at most `max_bytes` and its sender.
    ///
    /// Longer packets are truncated.
    pub async fn receive(&self, max_bytes: usize) -> Result<(Vec<u8>, Address)> {
        self.socket.recvfrom(max_bytes).await
    }

    /// Lazily receives packets until an empty one arrives or the endpoint
    /// is closed.
    pub fn receive_packets(&self, max_size: usize) -> Packets<'_, S> {
        Packets {
            endpoint: self,
            max_size,
            done: false,
        }
    }

    /// Sends one packet, to `destination` or else to the connected peer.
    pub async fn send(&self, data: &[u8], destination: Option<Address>) -> Result<()> {
        match destination {
            Some(address) => self.socket.sendto(data, address).await.map(drop),
            None => self.socket.send(data).await.map(drop),
        }
    }

    pub async fn close(&self) {
        self.socket.close().await
    }
}

impl<S: Scheduler> fmt::Debug for DatagramEndpoint<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DatagramEndpoint").field(&self.socket).finish()
    }
}

/// Sequence returned by [`DatagramEndpoint::receive_packets`].
pub struct Packets<'a, S: Scheduler> {
    endpoint: &'a DatagramEndpoint<S>,
    max_size: usize,
    done: bool,
}

impl<S: Scheduler> Packets<'_, S> {
    /// Next `(packet, sender)` pair. After an error the sequence is over.
    pub async fn next(&mut self) -> Option<Result<(Vec<u8>, Address)>> {
        if self.done || self.endpoint.socket.is_closed() {
            return None;
        }

        match self.endpoint.receive(self.max_size).await {
            Ok((packet, _)) if packet.is_empty() => {
                self.done = true;
                None
            }
            Ok(received) => Some(Ok(received)),
            Err(Error::ClosedResource) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
