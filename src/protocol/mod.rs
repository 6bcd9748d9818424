//! Client-server communication protocol.
//!
//! This module defines everything between a raw byte stream and a typed RPC call: the
//! SASL negotiated, length-prefixed transport, the request and response messages of both
//! protocol generations, and the client that exchanges them.
//!
//! # Overview
//!
//! A connection stacks three layers:
//!
//! - a [`ByteStream`], usually a TCP [`Socket`] or a [`TlsSocket`];
//! - either a [`BufferedTransport`] (no authentication) or a [`SaslTransport`] that runs
//!   the handshake on open and frames every flushed write;
//! - an [`RpcClient`] that encodes one [`Request`] per frame and decodes the matching
//!   [`Response`].
//!
//! # Handshake Format
//!
//! Every handshake message is a 1-byte status (`START=1`, `OK=2`, `BAD=3`, `ERROR=4`,
//! `COMPLETE=5`), a 4-byte big-endian payload length and the payload. The client sends
//! `START` with the mechanism name, then `OK` with the initial response, and answers each
//! server `OK` challenge until the server sends `COMPLETE`.
//!
//! # Frame Format
//!
//! After the handshake every message is a 4-byte big-endian length followed by the
//! payload, wrapped by the mechanism when the negotiated protection level requires it.
//! Declared lengths are checked against a configured maximum before anything is
//! allocated.
//!
//! # Message Encoding
//!
//! Requests and responses are `bincode` encoded with big-endian, fixed-width integers
//! (see [`wire_config`]). Status bearing responses carry an [`RpcStatus`] which callers
//! validate with [`RpcStatus::check`].
//!
//! # See Also
//!
//! - [`hive`](crate::hive): direct generation built on these messages.
//! - [`beeswax`](crate::beeswax): polling generation built on these messages.
pub mod handle;
pub mod request;
pub mod response;
pub mod rpc;
pub mod sasl;
pub mod tls;
pub mod transport;

pub use handle::{Guid, OperationHandle, QueryHandle, SessionHandle};
pub use request::{InfoType, ProtocolVersion, Request};
pub use response::{ColumnSpec, FieldSchema, Response, Results, RpcStatus, StatusCode};
pub use rpc::{Channel, RpcClient, wire_config};
pub use sasl::{MECHANISM_PLAIN, Mechanism, Plain, Qop, select_mechanism};
pub use tls::TlsSocket;
pub use transport::{BufferedTransport, ByteStream, SaslTransport, Socket, TransportError};
