use thiserror::Error;

use thunderbolt_chain::SerializationError;

use crate::protocol::external::types::ProtocolVersion;

/// An error concerning one peer connection.
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Serialization(#[from] SerializationError),

    #[error("remote peer closed the connection")]
    ConnectionClosed,

    #[error("handshake failed: {0}")]
    Handshake(&'static str),

    #[error("connection to ourselves detected")]
    SelfConnect,

    #[error("peer protocol version {0:?} is below the minimum")]
    ObsoleteVersion(ProtocolVersion),

    #[error("peer exceeded the ban threshold")]
    Banned,

    #[error("peer timed out")]
    Timeout,
}
