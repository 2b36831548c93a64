//! # remotecall-protocol
//!
//! Wire protocol implementation for the RC remote call protocol.
//!
//! This crate provides:
//! - The fixed 4-byte frame header shared by every message
//! - A closed set of packet variants with byte-exact encoding and decoding
//! - Splitting of a single socket read into frames
//! - Error types and protocol constants

pub mod codec;
pub mod error;
pub mod header;
pub mod packet;

pub use codec::{frames, FrameIter};
pub use error::ProtocolError;
pub use header::{Header, HEADER_SIZE, MAGIC, SPACER};
pub use packet::{ContentLengthStatus, HandshakeStatus, Packet, PacketType};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum size of a single frame, bounded by the receive buffer (1 KiB).
pub const MAX_FRAME_SIZE: usize = 1024;

/// Maximum content carried by one `Query` frame (header + type byte excluded).
pub const MAX_CHUNK_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE - 1;

/// Largest content length that can be negotiated (16-bit length field).
pub const MAX_CONTENT_LENGTH: usize = u16::MAX as usize;
