//! TLS socket verified against a CA bundle.
use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read, Write},
    net::{Shutdown, TcpStream},
    path::Path,
    sync::Arc,
    time::Duration,
};

use log::{debug, warn};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerName, StreamOwned};
use rustls_pemfile::certs;

use super::transport::{ByteStream, TransportError, connect_tcp};

/// Builds a client config trusting only the certificates in the PEM file at `path`.
pub fn client_config(path: &Path) -> Result<Arc<ClientConfig>, TransportError> {
    let file = File::open(path).map_err(|e| {
        TransportError::Tls(format!("cannot read CA file {}: {e}", path.display()))
    })?;
    let der = certs(&mut BufReader::new(file)).map_err(|e| {
        TransportError::Tls(format!("invalid PEM in {}: {e}", path.display()))
    })?;

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(&der[..]);
    if ignored > 0 {
        warn!("ignored {ignored} unparsable certificate(s) in {}", path.display());
    }
    if added == 0 {
        return Err(TransportError::Tls(format!(
            "no CA certificates found in {}",
            path.display()
        )));
    }

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// TCP socket running a TLS session, connected and handshaken on [`ByteStream::open`].
pub struct TlsSocket {
    address: String,
    server_name: ServerName,
    connect_timeout: Option<Duration>,
    config: Arc<ClientConfig>,
    stream: Option<StreamOwned<ClientConnection, TcpStream>>,
}

impl TlsSocket {
    /// `host` is the name the server certificate must be valid for.
    pub fn new(
        address: impl Into<String>,
        host: &str,
        connect_timeout: Option<Duration>,
        config: Arc<ClientConfig>,
    ) -> Result<Self, TransportError> {
        let server_name = ServerName::try_from(host)
            .map_err(|e| TransportError::Tls(format!("invalid server name {host}: {e}")))?;
        Ok(Self {
            address: address.into(),
            server_name,
            connect_timeout,
            config,
            stream: None,
        })
    }

    fn stream(&mut self) -> io::Result<&mut StreamOwned<ClientConnection, TcpStream>> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not open"))
    }
}

impl fmt::Debug for TlsSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSocket")
            .field("address", &self.address)
            .field("server_name", &self.server_name)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

impl ByteStream for TlsSocket {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Err(TransportError::AlreadyOpen);
        }
        let mut sock = connect_tcp(&self.address, self.connect_timeout)?;
        let mut conn = ClientConnection::new(Arc::clone(&self.config), self.server_name.clone())
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        while conn.is_handshaking() {
            conn.complete_io(&mut sock)
                .map_err(|e| TransportError::Tls(format!("handshake failed: {e}")))?;
        }
        debug!("TLS session established with {}", self.address);

        self.stream = Some(StreamOwned::new(conn, sock));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream.conn.send_close_notify();
            if let Err(e) = stream.flush() {
                debug!("close_notify to {} not delivered: {e}", self.address);
            }
            match stream.sock.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => return Err(e.into()),
                _ => debug!("closed TLS connection to {}", self.address),
            }
        }
        Ok(())
    }
}

impl Read for TlsSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.read(buf)
    }
}

impl Write for TlsSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }
}
