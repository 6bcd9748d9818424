use bincode::{
    config::{BigEndian, Configuration, Fixint, Limit},
    decode_from_std_read, encode_into_std_write,
};
use log::trace;

use super::{ByteStream, Request, Response, TransportError};
use crate::{
    config::DEFAULT_MAX_FRAME_SIZE,
    error::{Error, Result},
};

pub type WireConfig = Configuration<BigEndian, Fixint, Limit<{ DEFAULT_MAX_FRAME_SIZE }>>;

/// Encoding shared by both ends of the RPC channel.
///
/// Decoding is capped at [`DEFAULT_MAX_FRAME_SIZE`] bytes, so a declared string or
/// sequence length beyond it fails with [`Error::Deserialize`] before any allocation.
pub fn wire_config() -> WireConfig {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
        .with_limit::<{ DEFAULT_MAX_FRAME_SIZE }>()
}

/// Request/response exchange with the server.
pub trait Channel {
    fn call(&mut self, request: Request) -> Result<Response>;

    /// Closes the underlying transport.
    fn close(&mut self) -> Result<()>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn call(&mut self, request: Request) -> Result<Response> {
        (**self).call(request)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Bincode messages over a [`ByteStream`]. Each call encodes the request, flushes it as
/// one frame and blocks on the response.
pub struct RpcClient<T: ByteStream> {
    stream: T,
    config: WireConfig,
}

impl<T: ByteStream> RpcClient<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            config: wire_config(),
        }
    }

    /// Opens the stream, running the handshake when it is a SASL transport.
    pub fn open(&mut self) -> Result<()> {
        if !self.stream.is_open() {
            self.stream.open()?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_open()
    }

    pub fn stream(&self) -> &T {
        &self.stream
    }

    fn write_request(&mut self, request: &Request) -> Result<()> {
        encode_into_std_write(request, &mut self.stream, self.config).map_err(|e| match e {
            bincode::error::EncodeError::Io { inner, .. } => TransportError::from(inner).into(),
            other => Error::Serialize(other),
        })?;
        self.stream.flush().map_err(TransportError::from)?;
        Ok(())
    }

    fn read_response(&mut self) -> Result<Response> {
        decode_from_std_read(&mut self.stream, self.config).map_err(|e| match e {
            bincode::error::DecodeError::Io { inner, .. } => TransportError::from(inner).into(),
            other => Error::Deserialize(other),
        })
    }
}

impl<T: ByteStream> Channel for RpcClient<T> {
    fn call(&mut self, request: Request) -> Result<Response> {
        trace!("-> {}", request.method());
        self.write_request(&request)?;
        let response = self.read_response()?;
        trace!("<- {}", response.method());
        Ok(response)
    }

    fn close(&mut self) -> Result<()> {
        if self.stream.is_open() {
            self.stream.close()?;
        }
        Ok(())
    }
}

/// Error for a response that does not answer the request that was sent.
pub(crate) fn unexpected(expected: &str, response: &Response) -> Error {
    match response {
        Response::Exception { message, .. } => Error::ServerError(message.clone()),
        other => Error::Protocol(format!(
            "expected {expected} response, got {}",
            other.method()
        )),
    }
}
