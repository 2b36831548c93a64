//! Fixed frame header for RC.
//!
//! Every frame starts with the same 4-byte preamble:
//!
//! ```text
//! +--------+---------+--------+
//! | magic  | version | spacer |
//! | 2 bytes| 1 byte  | 1 byte |
//! +--------+---------+--------+
//! ```

use crate::error::ProtocolError;
use bytes::{BufMut, BytesMut};

/// Magic bytes identifying RC frames: "RC"
pub const MAGIC: [u8; 2] = *b"RC";

/// Value of the spacer byte closing the header.
pub const SPACER: u8 = 0xFF;

/// Size of the frame header in bytes (2+1+1 = 4).
pub const HEADER_SIZE: usize = 4;

/// A parsed RC frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic bytes, always [`MAGIC`] on a valid header.
    pub magic: [u8; 2],
    /// Protocol version.
    pub version: u8,
    /// Spacer, always [`SPACER`] on a valid header.
    pub spacer: u8,
}

impl Default for Header {
    fn default() -> Self {
        Self::new(crate::PROTOCOL_VERSION)
    }
}

impl Header {
    /// Creates a header for the given protocol version.
    pub fn new(version: u8) -> Self {
        Self {
            magic: MAGIC,
            version,
            spacer: SPACER,
        }
    }

    /// Writes the header into `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        self.validate()?;

        let start = buf.len();
        buf.put_slice(&self.magic);
        buf.put_u8(self.version);
        buf.put_u8(self.spacer);

        let written = buf.len() - start;
        if written != HEADER_SIZE {
            return Err(ProtocolError::MalformedHeader(format!(
                "length mismatch ({written})"
            )));
        }
        Ok(())
    }

    /// Encodes the header into exactly [`HEADER_SIZE`] bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes a header from exactly [`HEADER_SIZE`] bytes.
    ///
    /// The version byte is carried as-is; only magic and spacer are checked.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != HEADER_SIZE {
            return Err(ProtocolError::MalformedHeader(format!(
                "length mismatch ({})",
                bytes.len()
            )));
        }

        let header = Self {
            magic: [bytes[0], bytes[1]],
            version: bytes[2],
            spacer: bytes[3],
        };
        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if self.magic != MAGIC {
            return Err(ProtocolError::MalformedHeader(format!(
                "magic bytes ({:?})",
                String::from_utf8_lossy(&self.magic)
            )));
        }
        if self.spacer != SPACER {
            return Err(ProtocolError::MalformedHeader(format!(
                "spacer ({:#04x})",
                self.spacer
            )));
        }
        Ok(())
    }
}
