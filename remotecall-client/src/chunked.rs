//! Splitting of oversized payloads into `Query` chunks.

use crate::error::ClientError;
use bytes::Bytes;
use remotecall_protocol::MAX_CONTENT_LENGTH;

/// Returns the content length to negotiate for a payload of `len` bytes.
pub fn content_length(len: usize) -> Result<u16, ClientError> {
    u16::try_from(len).map_err(|_| ClientError::PayloadTooLarge {
        size: len,
        max: MAX_CONTENT_LENGTH,
    })
}

/// Number of chunks a payload of `len` bytes occupies.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size.max(1))
}

/// Splits `payload` into consecutive chunks of at most `chunk_size` bytes, in
/// original byte order. Only the last chunk may be shorter.
///
/// Chunks share the payload's buffer; nothing is copied.
pub fn chunks(payload: &Bytes, chunk_size: usize) -> Chunks {
    Chunks {
        remaining: payload.clone(),
        chunk_size: chunk_size.max(1),
    }
}

/// Iterator returned by [`chunks`].
#[derive(Debug, Clone)]
pub struct Chunks {
    remaining: Bytes,
    chunk_size: usize,
}

impl Iterator for Chunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.remaining.is_empty() {
            return None;
        }
        let len = self.chunk_size.min(self.remaining.len());
        Some(self.remaining.split_to(len))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = chunk_count(self.remaining.len(), self.chunk_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Chunks {}
