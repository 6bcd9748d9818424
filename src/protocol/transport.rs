use std::{
    io::{self, BufReader, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, trace};
use thiserror::Error;

use super::sasl::{Mechanism, NegotiationStatus, Qop};

const STATUS_BYTES: usize = 1;
const LENGTH_BYTES: usize = 4;
const MESSAGE_HEADER_BYTES: usize = STATUS_BYTES + LENGTH_BYTES;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {address}: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("handshake failed, peer indicated failure: {0}")]
    HandshakeFailed(String),

    #[error("invalid handshake status {0}")]
    InvalidHandshakeState(u8),

    #[error("none of the offered SASL mechanisms {0:?} are supported")]
    UnsupportedMechanism(Vec<String>),

    #[error("SASL mechanism error: {0}")]
    Mechanism(String),

    #[error("SASL authentication not complete")]
    NotAuthenticated,

    #[error("transport already open")]
    AlreadyOpen,

    #[error("declared frame length {length} is outside 0..={max}")]
    FrameTooLarge { length: i64, max: usize },

    #[error("short read: expected {expected} bytes, got {read}")]
    ShortRead { expected: usize, read: usize },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("transport IO error: {0}")]
    Io(io::Error),
}

/// Recovers a [`TransportError`] that travelled through an `io::Error`.
impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|e| e.is::<TransportError>()) {
            return TransportError::Io(err);
        }
        match err.into_inner().map(|e| e.downcast::<TransportError>()) {
            Some(Ok(inner)) => *inner,
            _ => TransportError::Io(io::Error::other("transport error lost in conversion")),
        }
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(inner) => inner,
            other => io::Error::other(other),
        }
    }
}

/// A bidirectional byte stream with an explicit open/close lifecycle.
pub trait ByteStream: Read + Write {
    fn open(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    fn close(&mut self) -> Result<(), TransportError>;
}

impl<T: ByteStream + ?Sized> ByteStream for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}

/// TCP socket connected on [`ByteStream::open`].
#[derive(Debug)]
pub struct Socket {
    address: String,
    connect_timeout: Option<Duration>,
    stream: Option<TcpStream>,
}

impl Socket {
    pub fn new(address: impl Into<String>, connect_timeout: Option<Duration>) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            stream: None,
        }
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not open"))
    }
}

impl ByteStream for Socket {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Err(TransportError::AlreadyOpen);
        }
        let stream = connect_tcp(&self.address, self.connect_timeout)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => return Err(e.into()),
                _ => debug!("closed connection to {}", self.address),
            }
        }
        Ok(())
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.read(buf)
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }
}

/// Connects with `TCP_NODELAY` set, trying each resolved address under `timeout`.
pub(crate) fn connect_tcp(
    address: &str,
    timeout: Option<Duration>,
) -> Result<TcpStream, TransportError> {
    let connect = || -> io::Result<TcpStream> {
        let Some(timeout) = timeout else {
            return TcpStream::connect(address);
        };

        let mut last = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last = Some(e),
            }
        }
        Err(last.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
        }))
    };

    let stream = connect()
        .and_then(|s| s.set_nodelay(true).map(|_| s))
        .map_err(|source| TransportError::ConnectFailed {
            address: address.to_string(),
            source,
        })?;
    debug!("connected to {address}");
    Ok(stream)
}

/// Unauthenticated transport: buffered reads, writes held until `flush`.
#[derive(Debug)]
pub struct BufferedTransport<S: ByteStream> {
    reader: BufReader<S>,
    write_buf: Vec<u8>,
}

impl<S: ByteStream> BufferedTransport<S> {
    pub fn new(stream: S, capacity: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity, stream),
            write_buf: Vec::with_capacity(capacity),
        }
    }
}

impl<S: ByteStream> ByteStream for BufferedTransport<S> {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.reader.get_ref().is_open() {
            return Err(TransportError::AlreadyOpen);
        }
        self.reader.get_mut().open()
    }

    fn is_open(&self) -> bool {
        self.reader.get_ref().is_open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.write_buf.clear();
        self.reader.get_mut().close()
    }
}

impl<S: ByteStream> Read for BufferedTransport<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<S: ByteStream> Write for BufferedTransport<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let inner = self.reader.get_mut();
        inner.write_all(&self.write_buf)?;
        self.write_buf.clear();
        inner.flush()
    }
}

/// SASL negotiated transport with length-prefixed frames.
///
/// `open` runs the handshake; afterwards every `flush` emits one frame
/// (`u32` big-endian length, payload) and reads are served frame by frame. When the
/// negotiated [`Qop`] protects traffic, payloads are wrapped and unwrapped by the
/// mechanism.
pub struct SaslTransport<S: ByteStream> {
    stream: S,
    mechanism: Box<dyn Mechanism>,
    read_buf: Vec<u8>,
    read_pos: usize,
    write_buf: Vec<u8>,
    qop: Qop,
    handshake_complete: bool,
    max_frame_size: usize,
}

impl<S: ByteStream> SaslTransport<S> {
    pub fn new(stream: S, mechanism: Box<dyn Mechanism>, max_frame_size: usize) -> Self {
        Self {
            stream,
            mechanism,
            read_buf: Vec::new(),
            read_pos: 0,
            write_buf: Vec::new(),
            qop: Qop::Auth,
            handshake_complete: false,
            max_frame_size,
        }
    }

    /// Protection level negotiated by the last handshake.
    pub fn qop(&self) -> Qop {
        self.qop
    }

    fn handshake(&mut self) -> Result<(), TransportError> {
        let name = self.mechanism.name().to_string();
        let initial = self.mechanism.start()?;
        debug!("starting SASL negotiation with mechanism {name}");

        self.send_message(NegotiationStatus::Start, name.as_bytes())?;
        self.send_message(NegotiationStatus::Ok, &initial)?;

        loop {
            let (status, payload) = self.receive_message()?;
            match status {
                NegotiationStatus::Complete => break,
                NegotiationStatus::Ok => {
                    let response = self.mechanism.step(&payload)?;
                    self.send_message(NegotiationStatus::Ok, &response)?;
                }
                NegotiationStatus::Bad | NegotiationStatus::Error => {
                    return Err(TransportError::HandshakeFailed(
                        String::from_utf8_lossy(&payload).into_owned(),
                    ));
                }
                NegotiationStatus::Start => {
                    return Err(TransportError::InvalidHandshakeState(status.into()));
                }
            }
        }

        self.qop = self.mechanism.qop();
        self.handshake_complete = true;
        debug!("SASL negotiation complete, qop={}", self.qop);
        Ok(())
    }

    fn send_message(
        &mut self,
        status: NegotiationStatus,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let length = self.outgoing_length(payload.len())?;
        let mut header = [0_u8; MESSAGE_HEADER_BYTES];
        header[0] = status.into();
        header[STATUS_BYTES..].copy_from_slice(&length.to_be_bytes());
        trace!("sending SASL message {status:?} with {} bytes", payload.len());

        self.stream.write_all(&header)?;
        self.stream.write_all(payload)?;
        self.stream.flush()?;
        Ok(())
    }

    fn receive_message(&mut self) -> Result<(NegotiationStatus, Vec<u8>), TransportError> {
        let mut header = [0_u8; MESSAGE_HEADER_BYTES];
        self.read_full(&mut header)?;

        let status = NegotiationStatus::try_from(header[0])?;
        let mut length = [0_u8; LENGTH_BYTES];
        length.copy_from_slice(&header[STATUS_BYTES..]);
        let length = self.incoming_length(i32::from_be_bytes(length))?;

        let mut payload = vec![0_u8; length];
        self.read_full(&mut payload)?;
        trace!("received SASL message {status:?} with {length} bytes");
        Ok((status, payload))
    }

    fn read_frame(&mut self) -> Result<(), TransportError> {
        let mut header = [0_u8; LENGTH_BYTES];
        self.read_full(&mut header)?;
        let length = self.incoming_length(i32::from_be_bytes(header))?;

        let mut payload = vec![0_u8; length];
        self.read_full(&mut payload)?;
        trace!("read frame of {length} bytes");

        self.read_buf = if self.qop.wraps() {
            self.mechanism.unwrap(&payload)?
        } else {
            payload
        };
        self.read_pos = 0;
        Ok(())
    }

    fn write_frame(&mut self) -> Result<(), TransportError> {
        // A failed wrap leaves the buffered bytes in place.
        let payload = if self.qop.wraps() {
            let wrapped = self.mechanism.wrap(&self.write_buf)?;
            self.write_buf.clear();
            wrapped
        } else {
            std::mem::take(&mut self.write_buf)
        };
        let length = self.outgoing_length(payload.len())?;
        trace!("writing frame of {length} bytes");

        self.stream.write_all(&length.to_be_bytes())?;
        self.stream.write_all(&payload)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Validates a declared length before anything is allocated for it.
    fn incoming_length(&self, length: i32) -> Result<usize, TransportError> {
        match usize::try_from(length) {
            Ok(len) if len <= self.max_frame_size => Ok(len),
            _ => Err(TransportError::FrameTooLarge {
                length: length.into(),
                max: self.max_frame_size,
            }),
        }
    }

    fn outgoing_length(&self, length: usize) -> Result<u32, TransportError> {
        match u32::try_from(length) {
            Ok(len) if length <= self.max_frame_size => Ok(len),
            _ => Err(TransportError::FrameTooLarge {
                length: i64::try_from(length).unwrap_or(i64::MAX),
                max: self.max_frame_size,
            }),
        }
    }

    /// Reads exactly `buf.len()` bytes from the inner stream.
    fn read_full(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut read = 0;
        while read < buf.len() {
            match self.stream.read(&mut buf[read..]) {
                Ok(0) => {
                    return Err(TransportError::ShortRead {
                        expected: buf.len(),
                        read,
                    });
                }
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotAuthenticated);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        while self.read_pos >= self.read_buf.len() {
            self.read_frame()?;
        }

        let available = &self.read_buf[self.read_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

impl<S: ByteStream> ByteStream for SaslTransport<S> {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.handshake_complete {
            return Err(TransportError::AlreadyOpen);
        }
        if !self.stream.is_open() {
            self.stream.open()?;
        }
        self.handshake()
    }

    fn is_open(&self) -> bool {
        self.handshake_complete && self.stream.is_open()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.handshake_complete = false;
        self.read_buf.clear();
        self.read_pos = 0;
        self.write_buf.clear();
        self.stream.close()
    }
}

impl<S: ByteStream> Read for SaslTransport<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}

impl<S: ByteStream> Write for SaslTransport<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(TransportError::NotAuthenticated.into());
        }
        self.write_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.is_open() {
            return Err(TransportError::NotAuthenticated.into());
        }
        Ok(self.write_frame()?)
    }
}
