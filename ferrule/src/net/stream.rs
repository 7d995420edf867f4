use super::address::Address;
use super::socket::{NonBlockingSocket, READ_CHUNK};
use super::tls::TlsContext;
use crate::error::{Error, Result};
use crate::runtime::handle::Handle;
use crate::scheduler::Scheduler;

use std::fmt;
use std::io;

/// A byte stream with framed reads.
///
/// Wraps one connected [`NonBlockingSocket`] and adds exact-length and
/// delimiter-terminated reads on top of it. No framing state survives
/// between calls: whatever a call does not consume stays in the socket.
///
/// A TLS context and expected peer hostname may be attached with
/// [`with_tls`](Self::with_tls); they are only used when
/// [`start_tls`](Self::start_tls) is called.
pub struct ByteStream<S: Scheduler = Handle> {
    socket: NonBlockingSocket<S>,
    tls_context: Option<TlsContext>,
    server_hostname: Option<String>,
}

impl<S: Scheduler> ByteStream<S> {
    pub fn new(socket: NonBlockingSocket<S>) -> Self {
        Self {
            socket,
            tls_context: None,
            server_hostname: None,
        }
    }

    /// Sets the TLS context and expected peer hostname used by a later
    /// [`start_tls`](Self::start_tls).
    ///
    /// A hostname makes the upgrade a client handshake that verifies the
    /// peer against it; without one the stream acts as the TLS server.
    pub fn with_tls(mut self, context: Option<TlsContext>, server_hostname: Option<String>) -> Self {
        self.tls_context = context;
        self.server_hostname = server_hostname;
        self
    }

    /// The underlying socket.
    pub fn socket(&self) -> &NonBlockingSocket<S> {
        &self.socket
    }

    pub fn into_socket(self) -> NonBlockingSocket<S> {
        self.socket
    }

    pub fn local_addr(&self) -> Result<Address> {
        self.socket.local_addr()
    }

    pub fn peer_addr(&self) -> Result<Address> {
        self.socket.peer_addr()
    }

    pub fn is_tls(&self) -> bool {
        self.socket.is_tls()
    }

    pub async fn close(&self) {
        self.socket.close().await
    }

    /// Returns whatever is available, up to `max_bytes`.
    ///
    /// An empty result means the peer closed the stream.
    pub async fn receive_some(&self, max_bytes: usize) -> Result<Vec<u8>> {
        self.socket.recv(max_bytes).await
    }

    /// Reads exactly `nbytes` bytes.
    ///
    /// Fails with [`Error::IncompleteRead`] carrying what was read if the
    /// stream ends first.
    pub async fn receive_exactly(&self, nbytes: usize) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();

        while buffer.len() < nbytes {
            // Grows with what arrives, so a huge `nbytes` costs nothing up front.
            let filled = buffer.len();
            buffer.resize(filled + (nbytes - filled).min(READ_CHUNK), 0);

            let read = self.socket.recv_into(&mut buffer[filled..]).await?;
            buffer.truncate(filled + read);

            if read == 0 {
                return Err(Error::IncompleteRead(buffer));
            }
        }

        Ok(buffer)
    }

    /// Reads up to (not including) `delimiter`, consuming the delimiter.
    ///
    /// At most `max_size` bytes are scanned. Bytes after the delimiter are
    /// left in the stream. Fails with [`Error::IncompleteRead`] if the
    /// stream ends first and with [`Error::DelimiterNotFound`] if
    /// `max_size` bytes were scanned without a match; both carry every
    /// byte consumed so far.
    pub async fn receive_until(&self, delimiter: &[u8], max_size: usize) -> Result<Vec<u8>> {
        if delimiter.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "delimiter must not be empty",
            )));
        }

        let mut buffer = Vec::new();
        let mut offset = 0;

        while buffer.len() < max_size {
            let data = self.socket.peek(max_size - buffer.len()).await?;

            if data.is_empty() {
                return Err(Error::IncompleteRead(buffer));
            }

            let consumed = buffer.len();
            buffer.extend_from_slice(&data);

            if let Some(index) = find(&buffer[offset..], delimiter).map(|i| i + offset) {
                // Everything before `consumed` was already taken off the socket.
                self.discard(index + delimiter.len() - consumed).await?;
                buffer.truncate(index);
                return Ok(buffer);
            }

            self.discard(data.len()).await?;

            // A delimiter straddling two reads starts at most this far back.
            offset = (buffer.len() + 1).saturating_sub(delimiter.len());
        }

        Err(Error::DelimiterNotFound(buffer))
    }

    /// Consumes `count` bytes already seen through `peek`.
    async fn discard(&self, mut count: usize) -> Result<()> {
        let mut scratch = vec![0u8; count.min(READ_CHUNK)];

        while count > 0 {
            let limit = count.min(scratch.len());
            let read = self.socket.recv_into(&mut scratch[..limit]).await?;

            if read == 0 {
                return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()));
            }

            count -= read;
        }

        Ok(())
    }

    /// Lazily yields chunks of at most `max_size` bytes until the stream
    /// ends. Chunks are never empty.
    pub fn receive_chunks(&self, max_size: usize) -> Chunks<'_, S> {
        Chunks {
            stream: self,
            max_size,
            done: false,
        }
    }

    /// Lazily yields `delimiter`-terminated chunks (delimiter stripped).
    ///
    /// The sequence ends quietly when the stream closes between chunks. A
    /// trailing partial chunk is yielded as [`Error::IncompleteRead`].
    pub fn receive_delimited_chunks<'a>(
        &'a self,
        delimiter: &'a [u8],
        max_chunk_size: usize,
    ) -> DelimitedChunks<'a, S> {
        DelimitedChunks {
            stream: self,
            delimiter,
            max_chunk_size,
            done: false,
        }
    }

    /// Sends all of `data`.
    pub async fn send_all(&self, data: &[u8]) -> Result<()> {
        self.socket.sendall(data).await
    }

    /// Upgrades the stream to TLS.
    ///
    /// Uses `context` if given, else the context set with
    /// [`with_tls`](Self::with_tls), else [`TlsContext::default_client`].
    /// On failure the stream keeps working in plain mode.
    pub async fn start_tls(&self, context: Option<&TlsContext>) -> Result<()> {
        let default;

        let context = match context.or(self.tls_context.as_ref()) {
            Some(context) => context,
            None => {
                default = TlsContext::default_client()?;
                &default
            }
        };

        self.socket
            .start_tls(context, self.server_hostname.as_deref())
            .await
    }
}

impl<S: Scheduler> fmt::Debug for ByteStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("socket", &self.socket)
            .field("server_hostname", &self.server_hostname)
            .finish_non_exhaustive()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Sequence returned by [`ByteStream::receive_chunks`].
pub struct Chunks<'a, S: Scheduler> {
    stream: &'a ByteStream<S>,
    max_size: usize,
    done: bool,
}

impl<S: Scheduler> Chunks<'_, S> {
    /// Next chunk; `None` at end of stream. After an error the sequence
    /// is over.
    pub async fn next(&mut self) -> Option<Result<Vec<u8>>> {
        if self.done {
            return None;
        }

        match self.stream.receive_some(self.max_size).await {
            Ok(data) if data.is_empty() => {
                self.done = true;
                None
            }
            Ok(data) => Some(Ok(data)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Sequence returned by [`ByteStream::receive_delimited_chunks`].
pub struct DelimitedChunks<'a, S: Scheduler> {
    stream: &'a ByteStream<S>,
    delimiter: &'a [u8],
    max_chunk_size: usize,
    done: bool,
}

impl<S: Scheduler> DelimitedChunks<'_, S> {
    /// Next chunk; `None` once the stream ends on a chunk boundary. After
    /// an error the sequence is over.
    pub async fn next(&mut self) -> Option<Result<Vec<u8>>> {
        if self.done {
            return None;
        }

        match self
            .stream
            .receive_until(self.delimiter, self.max_chunk_size)
            .await
        {
            Ok(chunk) => Some(Ok(chunk)),
            Err(Error::IncompleteRead(data)) if data.is_empty() => {
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

#[cfg(test)]
mod tests {
    use super::find;

    #[test]
    fn find_locates_first_match() {
        assert_eq!(find(b"hello\nworld\n", b"\n"), Some(5));
        assert_eq!(find(b"a\r\nb\r\n", b"\r\n"), Some(1));
        assert_eq!(find(b"abc", b"abcd"), None);
        assert_eq!(find(b"", b"x"), None);
    }
}
