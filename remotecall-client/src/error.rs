//! Client error types.

use remotecall_protocol::{ContentLengthStatus, HandshakeStatus, PacketType};
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] remotecall_protocol::ProtocolError),

    #[error("failed to resolve {addr}: {reason}")]
    Resolve { addr: String, reason: String },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("authentication failed: {0}")]
    AuthFailed(HandshakeStatus),

    #[error("content length rejected: {0}")]
    ContentNegotiation(ContentLengthStatus),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unexpected {0} packet")]
    UnexpectedPacket(PacketType),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection lost before the chunked send was queued")]
    ConnectionLost,

    #[error("dropped {0} packet queued for a previous connection")]
    StalePacket(PacketType),

    #[error("timeout")]
    Timeout,

    #[error("session closed")]
    SessionClosed,
}

impl ClientError {
    /// Returns whether the session recovers from this error by reconnecting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::Connect { .. }
                | ClientError::ConnectionClosed
                | ClientError::Timeout
        )
    }
}
