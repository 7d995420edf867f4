//! # Ferrule
//!
//! **Ferrule** is an async transport layer over raw non-blocking sockets.
//! It reconciles the syscall-level socket API (would-block, partial reads
//! and writes, TLS handshakes that need more data) with cooperative task
//! scheduling, while keeping byte-exact framing semantics.
//!
//! It provides:
//!
//! - A **non-blocking socket adapter** that suspends on readiness instead of
//!   blocking, with in-place **TLS upgrade** that never corrupts the plain
//!   connection when the handshake fails
//! - **Framed stream reads**: exact-length, delimiter-terminated and chunked
//! - A **stream listener** with optional TLS on every accepted connection
//! - A **datagram endpoint** for addressed and connected packets
//! - A pluggable [`Scheduler`], and a small **multi-threaded runtime** backed
//!   by an `epoll` reactor that implements it
//! - **Ergonomic macros**: `#[ferrule::main]`, `#[ferrule::test]` and `join!`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrule::net::{self, ListenOptions};
//!
//! #[ferrule::main]
//! async fn main() -> ferrule::Result<()> {
//!     let address: net::Address = "127.0.0.1:7000".parse()?;
//!     let listener = net::listen_tcp(address, ListenOptions::new()).await?;
//!     let mut incoming = listener.accept_connections();
//!
//!     while let Some(stream) = incoming.next().await {
//!         let stream = stream?;
//!         let line = stream.receive_until(b"\n", 1024).await?;
//!         stream.send_all(&line).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`net`]: Sockets, streams, listeners, datagram endpoints and TLS
//! - [`task`]: Spawning, joining and cancelling tasks

mod error;
mod reactor;
mod runtime;
mod scheduler;
mod sys;

pub mod net;

pub use error::{Error, Result};
pub use runtime::Runtime;
pub use runtime::builder::RuntimeBuilder;
pub use runtime::handle::Handle;
pub use runtime::task;
pub use runtime::yield_now::yield_now;
pub use scheduler::Scheduler;

pub use ferrule_macros::*;
