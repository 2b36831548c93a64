//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("unknown packet type: {0:#04x}")]
    UnknownPacketType(u8),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid UTF-8 in text field")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Returns whether the fault lies in the shared 4-byte header.
    pub fn is_header_error(&self) -> bool {
        matches!(self, ProtocolError::MalformedHeader(_))
    }
}
