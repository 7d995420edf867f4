//! TLS over non-blocking descriptors.
//!
//! [`TlsContext`] carries the `rustls` configurations a socket may upgrade
//! with. [`TlsSession`] drives one `rustls` connection straight over the
//! descriptor and reports "need more data" and "need to flush" as
//! [`Step::WantRead`] and [`Step::WantWrite`] so the socket can suspend.

use super::socket::{READ_CHUNK, Step};
use crate::error::{Error, Result};
use crate::sys;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, Connection, RootCertStore, ServerConfig, ServerConnection};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::os::fd::RawFd;
use std::path::Path;
use std::sync::Arc;

/// Upper bound on plaintext queued inside a session before it must be
/// flushed to the socket.
const SEND_BUFFER_LIMIT: usize = 64 * 1024;

/// Trust bundles tried, in order, when `SSL_CERT_FILE` is not set.
const SYSTEM_BUNDLES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/pki/ca-trust/extracted/pem/tls-ca-bundle.pem",
    "/etc/ssl/cert.pem",
];

/// TLS configuration for upgrading sockets.
///
/// A context may hold a client configuration, a server configuration, or
/// both. Upgrades with an expected peer hostname use the client side;
/// upgrades without one (accepted connections) use the server side.
#[derive(Clone, Default)]
pub struct TlsContext {
    client: Option<Arc<ClientConfig>>,
    server: Option<Arc<ServerConfig>>,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("client", &self.client.is_some())
            .field("server", &self.server.is_some())
            .finish()
    }
}

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn config_error(err: impl fmt::Display) -> Error {
    Error::TlsConfig(err.to_string())
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::TlsConfig(format!("{}: {e}", path.display())))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| Error::TlsConfig(format!("{}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(Error::TlsConfig(format!(
            "{}: no certificates found",
            path.display()
        )));
    }

    Ok(certs)
}

impl TlsContext {
    /// A context with only a client configuration.
    pub fn client(config: Arc<ClientConfig>) -> Self {
        Self {
            client: Some(config),
            server: None,
        }
    }

    /// A context with only a server configuration.
    pub fn server(config: Arc<ServerConfig>) -> Self {
        Self {
            client: None,
            server: Some(config),
        }
    }

    /// Adds (or replaces) the client configuration.
    pub fn with_client(mut self, config: Arc<ClientConfig>) -> Self {
        self.client = Some(config);
        self
    }

    /// Adds (or replaces) the server configuration.
    pub fn with_server(mut self, config: Arc<ServerConfig>) -> Self {
        self.server = Some(config);
        self
    }

    /// A client context trusting the system certificate bundle.
    ///
    /// The bundle is read from `SSL_CERT_FILE` when set, otherwise from the
    /// first well-known location that exists.
    pub fn default_client() -> Result<Self> {
        let path = match std::env::var_os("SSL_CERT_FILE") {
            Some(path) => path.into(),
            None => SYSTEM_BUNDLES
                .iter()
                .map(Path::new)
                .find(|p| p.exists())
                .map(Path::to_path_buf)
                .ok_or_else(|| Error::TlsConfig("no system certificate bundle found".into()))?,
        };

        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(load_certs(&path)?);

        tracing::debug!(bundle = %path.display(), added, ignored, "loaded trust roots");

        Self::with_root_certificates(roots)
    }

    /// A client context trusting exactly `roots`.
    pub fn with_root_certificates(roots: RootCertStore) -> Result<Self> {
        let config = ClientConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .map_err(config_error)?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self::client(Arc::new(config)))
    }

    /// A client context trusting the certificates of a PEM file.
    pub fn client_from_pem(ca_path: impl AsRef<Path>) -> Result<Self> {
        let mut roots = RootCertStore::empty();

        for cert in load_certs(ca_path.as_ref())? {
            roots.add(cert).map_err(config_error)?;
        }

        Self::with_root_certificates(roots)
    }

    /// A server context from a DER certificate chain and private key.
    pub fn server_from_der(
        chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
    ) -> Result<Self> {
        let config = ServerConfig::builder_with_provider(provider())
            .with_safe_default_protocol_versions()
            .map_err(config_error)?
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .map_err(config_error)?;

        Ok(Self::server(Arc::new(config)))
    }

    /// A server context from PEM files holding the certificate chain and
    /// the private key.
    pub fn server_from_pem(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        let chain = load_certs(cert_path.as_ref())?;

        let key_path = key_path.as_ref();
        let key = rustls_pemfile::private_key(&mut open(key_path)?)
            .map_err(|e| Error::TlsConfig(format!("{}: {e}", key_path.display())))?
            .ok_or_else(|| {
                Error::TlsConfig(format!("{}: no private key found", key_path.display()))
            })?;

        Self::server_from_der(chain, key)
    }

    pub fn client_config(&self) -> Option<&Arc<ClientConfig>> {
        self.client.as_ref()
    }

    pub fn server_config(&self) -> Option<&Arc<ServerConfig>> {
        self.server.as_ref()
    }
}

/// `Read`/`Write` straight on a non-blocking descriptor.
struct FdIo(RawFd);

impl Read for FdIo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        sys::sys_recv(self.0, buf, false)
    }
}

impl Write for FdIo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        sys::sys_send(self.0, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

/// One TLS connection layered over a socket descriptor.
pub(crate) struct TlsSession {
    conn: Connection,

    /// Plaintext handed out by `peek` but not consumed yet.
    peeked: Vec<u8>,
}

impl TlsSession {
    /// Builds a session; the handshake has not started yet.
    ///
    /// A hostname selects the client role, its absence the server role.
    pub(crate) fn new(context: &TlsContext, hostname: Option<&str>) -> Result<Self> {
        let mut conn: Connection = match hostname {
            Some(host) => {
                let config = context.client.clone().ok_or_else(|| {
                    Error::TlsConfig("context has no client configuration".into())
                })?;
                let name = ServerName::try_from(host.to_owned())
                    .map_err(|e| Error::TlsConfig(format!("{host}: {e}")))?;

                ClientConnection::new(config, name)?.into()
            }
            None => {
                let config = context.server.clone().ok_or_else(|| {
                    Error::TlsConfig("context has no server configuration".into())
                })?;

                ServerConnection::new(config)?.into()
            }
        };

        conn.set_buffer_limit(Some(SEND_BUFFER_LIMIT));

        Ok(Self {
            conn,
            peeked: Vec::new(),
        })
    }

    /// Advances the handshake as far as the socket allows.
    ///
    /// Protocol failures become [`Error::TlsHandshakeFailed`].
    pub(crate) fn handshake(&mut self, fd: RawFd) -> Result<Step<()>> {
        let mut io = FdIo(fd);

        loop {
            if self.conn.wants_write() {
                match self.conn.write_tls(&mut io) {
                    Ok(_) => continue,
                    Err(e) if would_block(&e) => return Ok(Step::WantWrite),
                    Err(e) => return Err(e.into()),
                }
            }

            if !self.conn.is_handshaking() {
                return Ok(Step::Ready(()));
            }

            match self.conn.read_tls(&mut io) {
                Ok(0) => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "peer closed the connection during the TLS handshake",
                    )));
                }
                Ok(_) => {
                    if let Err(err) = self.conn.process_new_packets() {
                        self.send_alert(fd);
                        return Err(Error::TlsHandshakeFailed(err));
                    }
                }
                Err(e) if would_block(&e) => return Ok(Step::WantRead),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads decrypted bytes. `Ready(0)` means the peer closed the stream.
    pub(crate) fn read(&mut self, fd: RawFd, buf: &mut [u8]) -> Result<Step<usize>> {
        if !self.peeked.is_empty() {
            let n = buf.len().min(self.peeked.len());
            buf[..n].copy_from_slice(&self.peeked[..n]);
            self.peeked.drain(..n);
            return Ok(Step::Ready(n));
        }

        self.read_fresh(fd, buf)
    }

    /// Returns decrypted bytes without consuming them.
    pub(crate) fn peek(&mut self, fd: RawFd, buf: &mut [u8]) -> Result<Step<usize>> {
        if self.peeked.is_empty() {
            let mut fresh = vec![0u8; buf.len().min(READ_CHUNK)];

            match self.read_fresh(fd, &mut fresh)? {
                Step::Ready(n) => self.peeked.extend_from_slice(&fresh[..n]),
                other => return Ok(other.map(|_| 0)),
            }
        }

        let n = buf.len().min(self.peeked.len());
        buf[..n].copy_from_slice(&self.peeked[..n]);
        Ok(Step::Ready(n))
    }

    fn read_fresh(&mut self, fd: RawFd, buf: &mut [u8]) -> Result<Step<usize>> {
        if buf.is_empty() {
            return Ok(Step::Ready(0));
        }

        let mut io = FdIo(fd);

        loop {
            match self.conn.reader().read(buf) {
                Ok(n) => return Ok(Step::Ready(n)),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Step::Ready(0)),
                Err(e) if would_block(&e) => {}
                Err(e) => return Err(e.into()),
            }

            // Alerts, key updates and the like must go out before we block
            // on the peer.
            if let Step::WantWrite = self.flush(fd)? {
                return Ok(Step::WantWrite);
            }

            match self.conn.read_tls(&mut io) {
                Ok(_) => {
                    if let Err(err) = self.conn.process_new_packets() {
                        self.send_alert(fd);
                        return Err(Error::Tls(err));
                    }
                }
                Err(e) if would_block(&e) => return Ok(Step::WantRead),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Encrypts part of `data`; a short count is a partial write.
    ///
    /// Ciphertext left over from earlier writes is pushed out first.
    pub(crate) fn write(&mut self, fd: RawFd, data: &[u8]) -> Result<Step<usize>> {
        if let Step::WantWrite = self.flush(fd)? {
            return Ok(Step::WantWrite);
        }

        let n = self.conn.writer().write(data)?;

        // Push what we can now; the rest goes out with the next write or flush.
        self.flush(fd)?;

        Ok(Step::Ready(n))
    }

    /// Pushes every buffered TLS record to the socket.
    pub(crate) fn flush(&mut self, fd: RawFd) -> Result<Step<()>> {
        let mut io = FdIo(fd);

        while self.conn.wants_write() {
            match self.conn.write_tls(&mut io) {
                Ok(_) => {}
                Err(e) if would_block(&e) => return Ok(Step::WantWrite),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Step::Ready(()))
    }

    /// Queues `close_notify` and sends it if the socket takes it right away.
    pub(crate) fn close_notify(&mut self, fd: RawFd) {
        self.conn.send_close_notify();
        self.send_alert(fd);
    }

    fn send_alert(&mut self, fd: RawFd) {
        let _ = self.conn.write_tls(&mut FdIo(fd));
    }
}
