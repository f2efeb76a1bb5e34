use std::io::{ErrorKind, Read};

use crate::buffer::ReceiveBuffer;
use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Outcome of a single [`FrameReader::read_once`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    /// This many bytes were appended to the receive buffer.
    Data(usize),
    /// The read timed out without data; the stream is still open.
    Idle,
}

/// Pulls bytes from a stream into a [`ReceiveBuffer`] and hands out whole frames.
///
/// Two ways to drive it: [`read_frame`](Self::read_frame) blocks until one
/// frame is complete, while [`read_once`](Self::read_once) plus
/// [`next_buffered`](Self::next_buffered) let a polling loop check a stop
/// flag between reads.
pub struct FrameReader<T> {
    stream: T,
    pending: ReceiveBuffer,
    chunk: Box<[u8]>,
}

impl<T: Read> FrameReader<T> {
    pub fn new(stream: T) -> Self {
        Self::with_config(stream, &FrameConfig::default())
    }

    /// Reader that rejects frames above `config.max_payload_size`.
    ///
    /// Timeouts in `config` belong to the stream; set them there.
    pub fn with_config(stream: T, config: &FrameConfig) -> Self {
        Self {
            stream,
            pending: ReceiveBuffer::with_max_payload(config.max_payload_size),
            chunk: vec![0u8; READ_CHUNK_SIZE].into_boxed_slice(),
        }
    }

    /// Block until a complete frame is available.
    ///
    /// EOF is `FrameError::ConnectionClosed`. A read timeout on the stream
    /// surfaces as `FrameError::Io` with kind `TimedOut`.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.next_buffered()? {
                return Ok(frame);
            }
            if self.read_once()? == ReadEvent::Idle {
                return Err(FrameError::Io(ErrorKind::TimedOut.into()));
            }
        }
    }

    /// One read from the stream into the receive buffer.
    ///
    /// `WouldBlock` and `TimedOut` map to [`ReadEvent::Idle`]; `Interrupted`
    /// is retried.
    pub fn read_once(&mut self) -> Result<ReadEvent> {
        loop {
            match self.stream.read(&mut self.chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    self.pending.extend(&self.chunk[..n]);
                    return Ok(ReadEvent::Data(n));
                }
                Err(err) => match err.kind() {
                    ErrorKind::Interrupted => {}
                    ErrorKind::WouldBlock | ErrorKind::TimedOut => return Ok(ReadEvent::Idle),
                    _ => return Err(FrameError::Io(err)),
                },
            }
        }
    }

    /// Next frame already sitting in the receive buffer. Never touches the stream.
    pub fn next_buffered(&mut self) -> Result<Option<Frame>> {
        self.pending.try_extract_frame()
    }
}
