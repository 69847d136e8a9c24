//! Length-prefixed framing on a stream socket
//!
//! Every message is `[magic: u32 LE][len: u32 LE][len payload bytes]`. The
//! decoder is fed whatever the socket returned and yields whole payloads
//! only, so partial reads never reach a message handler.

use bytes::{Buf, Bytes, BytesMut};

use crate::constants::{FRAME_HEADER_LEN, FRAME_MAGIC};
use crate::error::FrameError;

/// Write a frame header for a payload of `payload_len` bytes into `out`
pub fn write_header(out: &mut [u8], payload_len: usize) {
    out[..4].copy_from_slice(&FRAME_MAGIC.to_le_bytes());
    out[4..8].copy_from_slice(&(payload_len as u32).to_le_bytes());
}

/// Incremental frame decoder
pub struct FrameDecoder {
    buffer: BytesMut,
    max_payload: usize,
}

impl FrameDecoder {
    pub fn new(max_payload: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(FRAME_HEADER_LEN + max_payload),
            max_payload,
        }
    }

    /// Append bytes read from the socket
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete payload, if one is buffered.
    ///
    /// A bad magic or an oversized length is unrecoverable: the stream has
    /// lost sync and the connection must be dropped.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let magic = u32::from_le_bytes([
            self.buffer[0],
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
        ]);
        if magic != FRAME_MAGIC {
            return Err(FrameError::BadMagic(magic));
        }

        let len = u32::from_le_bytes([
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        ]) as usize;
        if len > self.max_payload {
            return Err(FrameError::TooLarge(len));
        }

        if self.buffer.len() < FRAME_HEADER_LEN + len {
            self.buffer.reserve(FRAME_HEADER_LEN + len - self.buffer.len());
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_LEN);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Bytes held that do not yet form a whole frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
