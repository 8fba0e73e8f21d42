//! Audio framing for transport.
//!
//! The backend expects speech audio in fixed-size binary frames; the host
//! delivers PCM in whatever chunk size its media clock produces. The framer
//! accumulates the incoming bytes and releases exactly one block at a time,
//! FIFO, leaving any remainder buffered for the next append.

use bytes::{Bytes, BytesMut};

/// Transport block size: 100 ms of 16 kHz 16-bit mono audio.
pub const AUDIO_BLOCK_SIZE: usize = 3200;

/// Growing byte accumulator with fixed-size block extraction.
#[derive(Debug, Default)]
pub struct AudioFramer {
    buf: BytesMut,
}

impl AudioFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(AUDIO_BLOCK_SIZE * 2),
        }
    }

    /// Append raw PCM bytes. Amortized O(1).
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Remove and return exactly one block when strictly more than one
    /// block is buffered; otherwise leave the buffer untouched.
    pub fn flush_block(&mut self) -> Option<Bytes> {
        if self.buf.len() > AUDIO_BLOCK_SIZE {
            Some(self.buf.split_to(AUDIO_BLOCK_SIZE).freeze())
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
