//! Receive buffer for accumulating partial socket reads.
//!
//! Bytes are appended at the tail and split off the head one complete frame
//! at a time. A trailing partial frame stays buffered until the next read
//! completes it.

use bytes::BytesMut;

use crate::codec::{decode_frame, Frame, DEFAULT_MAX_PAYLOAD};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Accumulates raw stream bytes and extracts complete frames.
///
/// The buffer is bounded by `max_payload`: a header that declares a larger
/// payload is rejected as soon as the header is visible, so the buffer never
/// has to hold an oversized frame.
#[derive(Debug)]
pub struct ReceiveBuffer {
    buf: BytesMut,
    max_payload: usize,
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveBuffer {
    /// Create a receive buffer with the default 16 MiB payload limit.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a receive buffer with an explicit payload limit.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_payload,
        }
    }

    /// Append bytes at the tail without extracting anything.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Extract the next complete frame, if one is buffered.
    ///
    /// The returned payload is split off the buffer and does not share
    /// storage with bytes that are still being accumulated.
    pub fn try_extract_frame(&mut self) -> Result<Option<Frame>> {
        decode_frame(&mut self.buf, self.max_payload)
    }

    /// Append `data` and extract every frame that is now complete, in order.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of buffered, not yet framed bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
