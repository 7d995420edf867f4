//! Error taxonomy shared by every socket operation.
//!
//! "Would block" never shows up here: it is resolved internally by
//! suspending on readiness and retrying. Everything else is surfaced to
//! the caller unmodified.

use std::io;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by sockets, streams, listeners and datagram endpoints.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The current task was cancelled before or while the operation ran.
    #[error("operation cancelled")]
    Cancelled,

    /// A non-blocking connect finished with a pending socket error.
    #[error("connection failed (os error {code})")]
    ConnectionFailed {
        /// The OS error code read from `SO_ERROR`.
        code: i32,
    },

    /// The peer closed the stream before a framed read completed.
    ///
    /// Carries whatever was read before end-of-stream.
    #[error("stream ended after {} byte(s) of an incomplete read", .0.len())]
    IncompleteRead(Vec<u8>),

    /// A delimiter-framed read exhausted its size bound.
    ///
    /// Carries every byte scanned (and consumed) while looking for it.
    #[error("delimiter not found within {} byte(s)", .0.len())]
    DelimiterNotFound(Vec<u8>),

    /// The TLS handshake was rejected. The socket still uses its plain handle.
    #[error("TLS handshake failed: {0}")]
    TlsHandshakeFailed(#[source] rustls::Error),

    /// TLS protocol failure after the handshake completed.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The TLS configuration cannot be used for the requested role.
    #[error("invalid TLS configuration: {0}")]
    TlsConfig(String),

    /// The socket was closed, possibly by another task while this one waited.
    #[error("socket is closed")]
    ClosedResource,

    /// Any other OS-level failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the partial payload carried by [`Error::IncompleteRead`] or
    /// [`Error::DelimiterNotFound`].
    pub fn partial_data(&self) -> Option<&[u8]> {
        match self {
            Error::IncompleteRead(data) | Error::DelimiterNotFound(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the OS error code behind this error, when there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::ConnectionFailed { code } => Some(*code),
            Error::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }
}
