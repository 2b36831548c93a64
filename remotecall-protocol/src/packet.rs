//! Packet variants carried in RC frames.
//!
//! Every packet is the shared [`Header`], one type byte, the variant's fixed
//! fields (multi-byte integers little-endian) and, for text-bearing variants,
//! a trailing variable-length field that runs to the end of the frame.
//!
//! | Variant                 | Type | Fixed fields   | Text     |
//! |-------------------------|------|----------------|----------|
//! | `ClientHandshake`       | 0x00 | -              | password |
//! | `ServerHandshakeResult` | 0x01 | result: u8     | -        |
//! | `QueryContentLength`    | 0x10 | length: u16    | -        |
//! | `ContentLengthResult`   | 0x11 | result: u8     | -        |
//! | `Query`                 | 0x12 | -              | content  |
//! | `QueryAccepted`         | 0x13 | query_id: u16  | -        |
//! | `QueryResult`           | 0x14 | query_id: u16  | content  |

use crate::error::ProtocolError;
use crate::header::{Header, HEADER_SIZE};
use crate::MAX_FRAME_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Offset of the packet type byte within a frame.
pub const TYPE_OFFSET: usize = HEADER_SIZE;

/// Offset of the first fixed field within a frame.
pub const BODY_OFFSET: usize = HEADER_SIZE + 1;

/// RC packet type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    ClientHandshake = 0x00,
    ServerHandshakeResult = 0x01,
    QueryContentLength = 0x10,
    ContentLengthResult = 0x11,
    Query = 0x12,
    QueryAccepted = 0x13,
    QueryResult = 0x14,
}

impl PacketType {
    /// Returns the wire code of this packet type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Looks up a packet type by its wire code.
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0x00 => Ok(PacketType::ClientHandshake),
            0x01 => Ok(PacketType::ServerHandshakeResult),
            0x10 => Ok(PacketType::QueryContentLength),
            0x11 => Ok(PacketType::ContentLengthResult),
            0x12 => Ok(PacketType::Query),
            0x13 => Ok(PacketType::QueryAccepted),
            0x14 => Ok(PacketType::QueryResult),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }

    /// Width in bytes of the fixed fields that follow the type byte.
    pub fn fixed_width(self) -> usize {
        match self {
            PacketType::ClientHandshake | PacketType::Query => 0,
            PacketType::ServerHandshakeResult | PacketType::ContentLengthResult => 1,
            PacketType::QueryContentLength | PacketType::QueryAccepted | PacketType::QueryResult => 2,
        }
    }

    /// Returns whether the variant ends in a variable-length text field.
    pub fn has_text(self) -> bool {
        matches!(
            self,
            PacketType::ClientHandshake | PacketType::Query | PacketType::QueryResult
        )
    }

    /// Smallest frame this variant can occupy.
    pub fn min_frame_len(self) -> usize {
        BODY_OFFSET + self.fixed_width()
    }

    /// Returns whether the variant is sent by the server.
    pub fn is_server_packet(self) -> bool {
        matches!(
            self,
            PacketType::ServerHandshakeResult
                | PacketType::ContentLengthResult
                | PacketType::QueryAccepted
                | PacketType::QueryResult
        )
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::ClientHandshake => write!(f, "CLIENT_HANDSHAKE"),
            PacketType::ServerHandshakeResult => write!(f, "SERVER_HANDSHAKE_RESULT"),
            PacketType::QueryContentLength => write!(f, "QUERY_CONTENT_LENGTH"),
            PacketType::ContentLengthResult => write!(f, "CONTENT_LENGTH_RESULT"),
            PacketType::Query => write!(f, "QUERY"),
            PacketType::QueryAccepted => write!(f, "QUERY_ACCEPTED"),
            PacketType::QueryResult => write!(f, "QUERY_RESULT"),
        }
    }
}

/// Result byte of a `ServerHandshakeResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStatus {
    Ok,
    BadPassword,
    VersionMismatch,
    /// A result byte this client does not know.
    Unknown(u8),
}

impl HandshakeStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, HandshakeStatus::Ok)
    }
}

impl From<u8> for HandshakeStatus {
    fn from(byte: u8) -> Self {
        match byte {
            0 => HandshakeStatus::Ok,
            1 => HandshakeStatus::BadPassword,
            2 => HandshakeStatus::VersionMismatch,
            other => HandshakeStatus::Unknown(other),
        }
    }
}

impl From<HandshakeStatus> for u8 {
    fn from(status: HandshakeStatus) -> Self {
        match status {
            HandshakeStatus::Ok => 0,
            HandshakeStatus::BadPassword => 1,
            HandshakeStatus::VersionMismatch => 2,
            HandshakeStatus::Unknown(other) => other,
        }
    }
}

impl fmt::Display for HandshakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeStatus::Ok => write!(f, "logged in"),
            HandshakeStatus::BadPassword => write!(f, "invalid password"),
            HandshakeStatus::VersionMismatch => write!(f, "wrong version"),
            HandshakeStatus::Unknown(code) => write!(f, "unknown handshake result ({code:#04x})"),
        }
    }
}

/// Result byte of a `ContentLengthResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentLengthStatus {
    Ok,
    TooShort,
    TooLong,
    AlreadyPending,
    /// A result byte this client does not know.
    Unknown(u8),
}

impl ContentLengthStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ContentLengthStatus::Ok)
    }
}

impl From<u8> for ContentLengthStatus {
    fn from(byte: u8) -> Self {
        match byte {
            0 => ContentLengthStatus::Ok,
            1 => ContentLengthStatus::TooShort,
            2 => ContentLengthStatus::TooLong,
            3 => ContentLengthStatus::AlreadyPending,
            other => ContentLengthStatus::Unknown(other),
        }
    }
}

impl From<ContentLengthStatus> for u8 {
    fn from(status: ContentLengthStatus) -> Self {
        match status {
            ContentLengthStatus::Ok => 0,
            ContentLengthStatus::TooShort => 1,
            ContentLengthStatus::TooLong => 2,
            ContentLengthStatus::AlreadyPending => 3,
            ContentLengthStatus::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ContentLengthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentLengthStatus::Ok => write!(f, "content length accepted"),
            ContentLengthStatus::TooShort => write!(f, "content too short"),
            ContentLengthStatus::TooLong => write!(f, "content too long"),
            ContentLengthStatus::AlreadyPending => write!(f, "query already pending"),
            ContentLengthStatus::Unknown(code) => {
                write!(f, "unknown content length result ({code:#04x})")
            }
        }
    }
}

/// A decoded RC packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ClientHandshake { password: String },
    ServerHandshakeResult { result: HandshakeStatus },
    QueryContentLength { content_length: u16 },
    ContentLengthResult { result: ContentLengthStatus },
    /// One chunk of query content. Raw bytes, since a chunk boundary may
    /// split a multi-byte character.
    Query { content: Bytes },
    QueryAccepted { query_id: u16 },
    QueryResult { query_id: u16, content: String },
}

impl Packet {
    pub fn handshake(password: impl Into<String>) -> Self {
        Packet::ClientHandshake {
            password: password.into(),
        }
    }

    pub fn query(content: impl Into<Bytes>) -> Self {
        Packet::Query {
            content: content.into(),
        }
    }

    pub fn content_length(content_length: u16) -> Self {
        Packet::QueryContentLength { content_length }
    }

    /// Returns the type of this packet.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::ClientHandshake { .. } => PacketType::ClientHandshake,
            Packet::ServerHandshakeResult { .. } => PacketType::ServerHandshakeResult,
            Packet::QueryContentLength { .. } => PacketType::QueryContentLength,
            Packet::ContentLengthResult { .. } => PacketType::ContentLengthResult,
            Packet::Query { .. } => PacketType::Query,
            Packet::QueryAccepted { .. } => PacketType::QueryAccepted,
            Packet::QueryResult { .. } => PacketType::QueryResult,
        }
    }

    fn text_len(&self) -> usize {
        match self {
            Packet::ClientHandshake { password } => password.len(),
            Packet::Query { content } => content.len(),
            Packet::QueryResult { content, .. } => content.len(),
            _ => 0,
        }
    }

    /// Number of bytes [`Packet::encode`] produces:
    /// header + type + fixed fields + text.
    pub fn encoded_len(&self) -> usize {
        self.packet_type().min_frame_len() + self.text_len()
    }

    /// Encodes the packet into a complete frame.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let packet_type = self.packet_type();
        let expected = self.encoded_len();
        if expected > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: expected,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(expected);
        Header::default().encode_into(&mut buf)?;
        buf.put_u8(packet_type.code());

        match self {
            Packet::ClientHandshake { password } => buf.put_slice(password.as_bytes()),
            Packet::ServerHandshakeResult { result } => buf.put_u8((*result).into()),
            Packet::QueryContentLength { content_length } => buf.put_u16_le(*content_length),
            Packet::ContentLengthResult { result } => buf.put_u8((*result).into()),
            Packet::Query { content } => buf.put_slice(content),
            Packet::QueryAccepted { query_id } => buf.put_u16_le(*query_id),
            Packet::QueryResult { query_id, content } => {
                buf.put_u16_le(*query_id);
                buf.put_slice(content.as_bytes());
            }
        }

        if buf.len() != expected {
            return Err(ProtocolError::MalformedPacket(format!(
                "{packet_type} length mismatch ({} != {expected})",
                buf.len()
            )));
        }
        Ok(buf)
    }

    /// Validates the header of `frame` and returns its packet type.
    pub fn peek_type(frame: &[u8]) -> Result<PacketType, ProtocolError> {
        let header = frame.get(..HEADER_SIZE).ok_or_else(|| {
            ProtocolError::MalformedHeader(format!("length mismatch ({})", frame.len()))
        })?;
        Header::decode(header)?;

        let code = frame
            .get(TYPE_OFFSET)
            .copied()
            .ok_or_else(|| ProtocolError::MalformedPacket("missing packet type".to_string()))?;
        PacketType::from_code(code)
    }

    /// Decodes a complete frame, dispatching on its type byte.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let packet_type = Self::peek_type(frame)?;
        Self::decode_as(packet_type, frame)
    }

    /// Decodes a complete frame as the given variant.
    ///
    /// Fails if the frame's type byte names a different variant, if a
    /// fixed-only variant is not exactly its fixed size, or if a text-bearing
    /// variant is too short to hold its fixed fields.
    pub fn decode_as(packet_type: PacketType, frame: &[u8]) -> Result<Self, ProtocolError> {
        let actual = Self::peek_type(frame)?;
        if actual != packet_type {
            return Err(ProtocolError::MalformedPacket(format!(
                "expected {packet_type}, got {actual}"
            )));
        }

        let body = &frame[BODY_OFFSET..];
        let fixed = packet_type.fixed_width();
        if packet_type.has_text() {
            if body.len() < fixed {
                return Err(ProtocolError::MalformedPacket(format!(
                    "{packet_type} too short ({})",
                    frame.len()
                )));
            }
        } else if body.len() != fixed {
            return Err(ProtocolError::MalformedPacket(format!(
                "{packet_type} length mismatch ({} != {})",
                frame.len(),
                packet_type.min_frame_len()
            )));
        }

        let (fields, text) = body.split_at(fixed);
        let packet = match packet_type {
            PacketType::ClientHandshake => Packet::ClientHandshake {
                password: decode_text(text)?,
            },
            PacketType::ServerHandshakeResult => Packet::ServerHandshakeResult {
                result: fields[0].into(),
            },
            PacketType::QueryContentLength => Packet::QueryContentLength {
                content_length: u16::from_le_bytes([fields[0], fields[1]]),
            },
            PacketType::ContentLengthResult => Packet::ContentLengthResult {
                result: fields[0].into(),
            },
            PacketType::Query => Packet::Query {
                content: Bytes::copy_from_slice(text),
            },
            PacketType::QueryAccepted => Packet::QueryAccepted {
                query_id: u16::from_le_bytes([fields[0], fields[1]]),
            },
            PacketType::QueryResult => Packet::QueryResult {
                query_id: u16::from_le_bytes([fields[0], fields[1]]),
                content: decode_text(text)?,
            },
        };
        Ok(packet)
    }
}

fn decode_text(bytes: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidUtf8)
}
