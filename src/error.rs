//! Error taxonomy shared by every layer of the client.
use thiserror::Error;

use crate::{decode::DecodeError, protocol::TransportError};

/// Top-level error returned by sessions, operations and result sets.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport is unusable; the connection should be closed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode request: {0}")]
    Serialize(#[from] bincode::error::EncodeError),

    #[error("failed to decode response: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),

    /// The server answered with an `ERROR` status.
    #[error("server error: {0}")]
    ServerError(String),

    /// The server no longer recognises the session or operation handle.
    #[error("invalid handle")]
    BadHandle,

    /// The query reached a terminal state other than finished.
    #[error("query failed execution: {0}")]
    ExecutionFailed(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A cancellation signal was observed while waiting or fetching.
    #[error("operation cancelled")]
    Cancelled,

    /// The server sent a response that does not fit the request.
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
