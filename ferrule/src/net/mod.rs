//! Networking over non-blocking sockets.
//!
//! [`NonBlockingSocket`] adapts one OS socket to cooperative scheduling.
//! The higher-level types build on it:
//! - [`ByteStream`]: framed reads and TLS upgrade on a connected stream,
//! - [`StreamListener`]: accepting connections, optionally over TLS,
//! - [`DatagramEndpoint`]: whole-packet send and receive.
//!
//! The free functions ([`connect_tcp`], [`listen_tcp`], [`bind_udp`], ...)
//! create them on the current runtime.

mod address;
mod datagram;
mod listener;
mod open;
mod socket;
mod stream;
mod tls;

pub use address::Address;
pub use datagram::{DatagramEndpoint, Packets};
pub use listener::{Incoming, StreamListener};
pub use open::{
    ListenOptions, bind_udp, connect_tcp, connect_tcp_tls, connect_unix, listen_tcp,
    listen_tcp_tls, listen_unix, stream_pair,
};
pub use socket::NonBlockingSocket;
pub use stream::{ByteStream, Chunks, DelimitedChunks};
pub use tls::TlsContext;

pub use rustls;
