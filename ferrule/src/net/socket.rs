use super::address::Address;
use super::tls::{TlsContext, TlsSession};
use crate::error::{Error, Result};
use crate::runtime::handle::Handle;
use crate::scheduler::Scheduler;
use crate::sys::{self, SockAddr};

use std::fmt;
use std::future::Future;
use std::io;
use std::net::Shutdown;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Waker};

/// Outcome of one non-blocking attempt.
pub(crate) enum Step<T> {
    /// The operation completed.
    Ready(T),

    /// Retry once the descriptor is readable.
    WantRead,

    /// Retry once the descriptor is writable.
    WantWrite,
}

impl<T> Step<T> {
    pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Step::Ready(value) => Step::Ready(f(value)),
            Step::WantRead => Step::WantRead,
            Step::WantWrite => Step::WantWrite,
        }
    }
}

/// How many times an operation may suspend before giving up.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Suspend once, retry once; a second would-block is an error.
    Once,

    /// Suspend and retry until the operation completes.
    UntilReady,
}

/// Largest buffer a single stream read allocates, whatever bound the
/// caller passes. Callers that want more loop.
pub(crate) const READ_CHUNK: usize = 64 * 1024;

/// Largest datagram `recvfrom` allocates for. Above the default Linux
/// socket buffer limit, so only oversized Unix datagrams get truncated.
const MAX_DATAGRAM: usize = 256 * 1024;

/// A readiness wait already registered with the scheduler.
enum Wait<R, W> {
    Read(R),
    Write(W),
}

impl<R, W> Wait<R, W>
where
    R: Future<Output = Result<()>>,
    W: Future<Output = Result<()>>,
{
    async fn finish(self) -> Result<()> {
        match self {
            Wait::Read(wait) => wait.await,
            Wait::Write(wait) => wait.await,
        }
    }
}

/// Turns a would-block into `WantRead`.
fn on_read<T>(result: io::Result<T>) -> Result<Step<T>> {
    match result {
        Ok(value) => Ok(Step::Ready(value)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Step::WantRead),
        Err(e) => Err(e.into()),
    }
}

/// Turns a would-block into `WantWrite`.
fn on_write<T>(result: io::Result<T>) -> Result<Step<T>> {
    match result {
        Ok(value) => Ok(Step::Ready(value)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Step::WantWrite),
        Err(e) => Err(e.into()),
    }
}

fn connect_pending(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS) || err.kind() == io::ErrorKind::WouldBlock
}

pub(crate) struct SocketState {
    /// The OS handle, `-1` once closed.
    fd: RawFd,

    /// Set once a TLS upgrade has completed; all I/O then goes through it.
    tls: Option<TlsSession>,
}

/// A socket adapted to cooperative scheduling.
///
/// Owns exactly one OS socket, kept in non-blocking mode for its whole
/// life. Every operation first checks for cancellation, then attempts the
/// syscall and, when it would block, suspends on the scheduler's readiness
/// hooks before retrying. After [`start_tls`](Self::start_tls) succeeds all
/// I/O is routed through the TLS session.
///
/// `accept`, `recvfrom`, `sendto` and `connect` suspend at most once: if
/// the retry would block again it fails with an [`Error::Io`] of kind
/// `WouldBlock`. `recv`, `send` and `sendall` retry until they complete.
///
/// The handle is released by [`close`](Self::close), or on drop.
pub struct NonBlockingSocket<S: Scheduler = Handle> {
    state: Mutex<SocketState>,
    scheduler: S,
}

impl NonBlockingSocket<Handle> {
    /// Adopts a socket on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a runtime.
    pub fn new(fd: OwnedFd) -> Result<Self> {
        Self::with_scheduler(fd, Handle::current())
    }
}

impl<S: Scheduler> NonBlockingSocket<S> {
    /// Adopts a socket, switching it to non-blocking mode.
    pub fn with_scheduler(fd: OwnedFd, scheduler: S) -> Result<Self> {
        sys::sys_set_nonblocking(fd.as_raw_fd())?;

        Ok(Self::from_raw(fd.into_raw_fd(), scheduler))
    }

    /// Wraps a descriptor created non-blocking by this crate.
    pub(crate) fn from_raw(fd: RawFd, scheduler: S) -> Self {
        Self {
            state: Mutex::new(SocketState { fd, tls: None }),
            scheduler,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SocketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn fd(&self) -> Result<RawFd> {
        match self.lock().fd {
            fd if fd < 0 => Err(Error::ClosedResource),
            fd => Ok(fd),
        }
    }

    /// The scheduler this socket suspends on.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Runs `op` against the live socket state, suspending whenever it asks.
    ///
    /// The state lock is held while `op` runs and while its wait is
    /// registered, never across the wait itself. A `close` racing with
    /// the operation can therefore only notify the scheduler after the
    /// registration, which fails the wait instead of leaving it on a
    /// descriptor that reuses the number.
    async fn drive<T, F>(&self, retry: Retry, mut op: F) -> Result<T>
    where
        T: Send,
        F: FnMut(&mut SocketState) -> Result<Step<T>> + Send,
    {
        let mut waited = false;

        loop {
            self.scheduler.check_cancelled()?;

            let wait = {
                let mut state = self.lock();

                if state.fd < 0 {
                    return Err(Error::ClosedResource);
                }

                match op(&mut *state)? {
                    Step::Ready(value) => return Ok(value),
                    Step::WantRead | Step::WantWrite if waited && retry == Retry::Once => {
                        return Err(io::Error::from(io::ErrorKind::WouldBlock).into());
                    }
                    Step::WantRead => Wait::Read(self.scheduler.wait_readable(state.fd)),
                    Step::WantWrite => Wait::Write(self.scheduler.wait_writable(state.fd)),
                }
            };

            wait.finish().await?;
            waited = true;
        }
    }

    /// Resolves host names on the off-load thread.
    async fn resolve(&self, address: Address) -> Result<Address> {
        if !matches!(address, Address::Host { .. }) {
            return Ok(address);
        }

        self.scheduler.run_in_thread(move || address.resolve()).await
    }

    /// Accepts one pending connection.
    pub async fn accept(&self) -> Result<(NonBlockingSocket<S>, Address)> {
        let (fd, peer) = self
            .drive(Retry::Once, |state| on_read(sys::sys_accept(state.fd)))
            .await?;

        Ok((Self::from_raw(fd, self.scheduler.clone()), peer))
    }

    /// Binds to `address`.
    ///
    /// Resolved IP addresses are bound in place. Host names and filesystem
    /// paths may block, so they are bound on the scheduler's off-load thread.
    pub async fn bind(&self, address: impl Into<Address>) -> Result<()> {
        self.scheduler.check_cancelled()?;

        let address = address.into();
        let fd = self.fd()?;

        if address.is_resolved() {
            sys::sys_bind(fd, &SockAddr::from_address(&address)?)?;
            return Ok(());
        }

        self.scheduler
            .run_in_thread(move || {
                let address = address.resolve()?;
                sys::sys_bind(fd, &SockAddr::from_address(&address)?)
            })
            .await
    }

    /// Connects to `address`.
    ///
    /// Waits once for writability, then reads the pending socket error; a
    /// nonzero code fails with [`Error::ConnectionFailed`].
    pub async fn connect(&self, address: impl Into<Address>) -> Result<()> {
        self.scheduler.check_cancelled()?;

        let address = self.resolve(address.into()).await?;
        let raw = SockAddr::from_address(&address)?;

        let (fd, wait) = {
            let state = self.lock();

            if state.fd < 0 {
                return Err(Error::ClosedResource);
            }

            match sys::sys_connect(state.fd, &raw) {
                Ok(()) => (state.fd, None),
                Err(e) if connect_pending(&e) => {
                    (state.fd, Some(self.scheduler.wait_writable(state.fd)))
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(wait) = wait {
            wait.await?;
        }

        let code = sys::sys_take_socket_error(self.fd()?)?;

        if code != 0 {
            tracing::debug!(fd, %address, code, "connect failed");
            return Err(Error::ConnectionFailed { code });
        }

        Ok(())
    }

    /// Receives up to `size` bytes. An empty result means the peer closed.
    ///
    /// At most 64 KiB are returned per call.
    pub async fn recv(&self, size: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size.min(READ_CHUNK)];
        let n = self.recv_into(&mut buffer).await?;

        buffer.truncate(n);
        Ok(buffer)
    }

    /// Receives into `buffer`, returning the number of bytes read.
    pub async fn recv_into(&self, buffer: &mut [u8]) -> Result<usize> {
        self.drive(Retry::UntilReady, |state| match state.tls.as_mut() {
            Some(tls) => tls.read(state.fd, buffer),
            None => on_read(sys::sys_recv(state.fd, buffer, false)),
        })
        .await
    }

    /// Returns up to `size` bytes without consuming them, at most
    /// 64 KiB per call.
    pub async fn peek(&self, size: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size.min(READ_CHUNK)];

        let n = self
            .drive(Retry::UntilReady, |state| match state.tls.as_mut() {
                Some(tls) => tls.peek(state.fd, &mut buffer),
                None => on_read(sys::sys_recv(state.fd, &mut buffer, true)),
            })
            .await?;

        buffer.truncate(n);
        Ok(buffer)
    }

    /// Receives one datagram of at most `size` bytes and its sender.
    pub async fn recvfrom(&self, size: usize) -> Result<(Vec<u8>, Address)> {
        let mut buffer = vec![0u8; size.min(MAX_DATAGRAM)];
        let (n, sender) = self.recvfrom_into(&mut buffer).await?;

        buffer.truncate(n);
        Ok((buffer, sender))
    }

    /// Receives one datagram into `buffer`.
    pub async fn recvfrom_into(&self, buffer: &mut [u8]) -> Result<(usize, Address)> {
        self.drive(Retry::Once, |state| {
            on_read(sys::sys_recvfrom(state.fd, buffer))
        })
        .await
    }

    /// Sends part of `data`, returning how much was accepted.
    pub async fn send(&self, data: &[u8]) -> Result<usize> {
        self.drive(Retry::UntilReady, |state| match state.tls.as_mut() {
            Some(tls) => tls.write(state.fd, data),
            None => on_write(sys::sys_send(state.fd, data)),
        })
        .await
    }

    /// Sends one datagram to `address`.
    pub async fn sendto(&self, data: &[u8], address: impl Into<Address>) -> Result<usize> {
        self.scheduler.check_cancelled()?;

        let address = self.resolve(address.into()).await?;
        let raw = SockAddr::from_address(&address)?;

        self.drive(Retry::Once, |state| {
            on_write(sys::sys_sendto(state.fd, data, &raw))
        })
        .await
    }

    /// Sends all of `data`, however many writes it takes.
    pub async fn sendall(&self, data: &[u8]) -> Result<()> {
        let mut sent = 0;

        while sent < data.len() {
            sent += self.send(&data[sent..]).await?;
        }

        self.drive(Retry::UntilReady, |state| match state.tls.as_mut() {
            Some(tls) => tls.flush(state.fd),
            None => Ok(Step::Ready(())),
        })
        .await
    }

    /// Upgrades the connection to TLS.
    ///
    /// With `hostname` the socket takes the client role and verifies the
    /// peer against it; without, it takes the server role. The session is
    /// only installed once the handshake has completed: on any failure the
    /// socket keeps using its plain handle.
    pub async fn start_tls(&self, context: &TlsContext, hostname: Option<&str>) -> Result<()> {
        self.scheduler.check_cancelled()?;

        if self.is_tls() {
            return Err(Error::TlsConfig("socket already uses TLS".into()));
        }

        let mut session = TlsSession::new(context, hostname)?;
        let role = if hostname.is_some() { "client" } else { "server" };

        tracing::debug!(fd = self.fd()?, role, "starting TLS handshake");

        loop {
            let wait = {
                let state = self.lock();

                if state.fd < 0 {
                    return Err(Error::ClosedResource);
                }

                match session.handshake(state.fd) {
                    Ok(Step::Ready(())) => break,
                    Ok(Step::WantRead) => Wait::Read(self.scheduler.wait_readable(state.fd)),
                    Ok(Step::WantWrite) => Wait::Write(self.scheduler.wait_writable(state.fd)),
                    Err(err) => {
                        tracing::warn!(fd = state.fd, role, error = %err, "TLS handshake failed");
                        return Err(err);
                    }
                }
            };

            wait.finish().await?;
        }

        let mut state = self.lock();

        if state.fd < 0 {
            return Err(Error::ClosedResource);
        }

        state.tls = Some(session);
        tracing::debug!(fd = state.fd, role, "TLS handshake complete");

        Ok(())
    }

    /// Closes the socket.
    ///
    /// The scheduler is notified first, so tasks suspended on the handle
    /// wake with [`Error::ClosedResource`]; then the handle is released.
    /// Closing twice is a no-op.
    pub async fn close(&self) {
        let (fd, tls) = {
            let mut state = self.lock();
            let fd = std::mem::replace(&mut state.fd, -1);
            (fd, state.tls.take())
        };

        if fd < 0 {
            return;
        }

        if let Some(mut tls) = tls {
            tls.close_notify(fd);
        }

        self.scheduler.notify_close(fd).await;
        sys::sys_close(fd);

        tracing::trace!(fd, "socket closed");
    }

    /// The OS handle, or `None` once closed.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.fd().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().fd < 0
    }

    /// Returns `true` once a TLS upgrade has completed.
    pub fn is_tls(&self) -> bool {
        self.lock().tls.is_some()
    }

    pub fn local_addr(&self) -> Result<Address> {
        Ok(sys::sys_sockname(self.fd()?)?)
    }

    pub fn peer_addr(&self) -> Result<Address> {
        Ok(sys::sys_peername(self.fd()?)?)
    }

    /// Shuts down one or both directions of the connection.
    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        Ok(sys::sys_shutdown(self.fd()?, how)?)
    }

    /// Enables or disables Nagle's algorithm on TCP sockets.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        Ok(sys::sys_set_nodelay(self.fd()?, nodelay)?)
    }
}

impl<S: Scheduler> fmt::Debug for NonBlockingSocket<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();

        f.debug_struct("NonBlockingSocket")
            .field("fd", &state.fd)
            .field("tls", &state.tls.is_some())
            .finish()
    }
}

impl<S: Scheduler> Drop for NonBlockingSocket<S> {
    /// Releases a socket that was never closed explicitly.
    ///
    /// The close notification gets a single poll; schedulers that need to
    /// suspend to process it should be closed explicitly instead.
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);

        if state.fd < 0 {
            return;
        }

        let fd = std::mem::replace(&mut state.fd, -1);

        if let Some(mut tls) = state.tls.take() {
            tls.close_notify(fd);
        }

        let notified = pin!(self.scheduler.notify_close(fd));
        let _ = notified.poll(&mut Context::from_waker(Waker::noop()));

        sys::sys_close(fd);
    }
}
